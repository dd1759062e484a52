//! The descriptive kind table (spec §4.8): `kind -> {plural, result
//! component}`, used by the CLI and by `crd generate` to iterate every
//! kind. The actual render/scrape/parse capability dispatch lives in the
//! `BenchmarkResource` trait implementations (spec §9), not here — this
//! table is metadata, not a second dispatch mechanism.

pub struct KindMeta {
    pub kind: &'static str,
    pub plural: &'static str,
    pub result_component: &'static str,
}

pub const KIND_TABLE: &[KindMeta] = &[
    KindMeta {
        kind: "IPerf",
        plural: "iperfs",
        result_component: "client",
    },
    KindMeta {
        kind: "MPIPingPong",
        plural: "mpipingpongs",
        result_component: "master",
    },
    KindMeta {
        kind: "OpenFOAM",
        plural: "openfoams",
        result_component: "master",
    },
    KindMeta {
        kind: "RDMABandwidth",
        plural: "rdmabandwidths",
        result_component: "client",
    },
    KindMeta {
        kind: "RDMALatency",
        plural: "rdmalatencies",
        result_component: "client",
    },
    KindMeta {
        kind: "Fio",
        plural: "fios",
        result_component: "master",
    },
    KindMeta {
        kind: "PyTorch",
        plural: "pytorches",
        result_component: "client",
    },
];

pub fn find(kind: &str) -> Option<&'static KindMeta> {
    KIND_TABLE.iter().find(|entry| entry.kind == kind)
}
