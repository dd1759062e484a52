use kube_perftest::registry::KIND_TABLE;

/// Print every registered benchmark kind and its plural/result-component
/// metadata (spec §4.8).
pub fn list() {
    println!("{:<16} {:<16} {:<16}", "KIND", "PLURAL", "RESULT COMPONENT");
    println!("{}", "-".repeat(48));
    for entry in KIND_TABLE {
        println!("{:<16} {:<16} {:<16}", entry.kind, entry.plural, entry.result_component);
    }
    println!("\nTotal: {} benchmark kinds", KIND_TABLE.len());
}
