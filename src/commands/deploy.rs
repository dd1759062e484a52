//! Fixed install manifests for the operator's own `reconcile` process
//! (spec.md §9: string templates are acceptable for this small,
//! cluster-admin-facing, rarely-changing set of YAML, unlike the
//! per-benchmark child objects rendered in `template.rs`).

/* ============================= CONSTANTS ============================= */

const NAMESPACE: &str = "kube-perftest";
const APP_NAME: &str = "kube-perftest";
const IMAGE: &str = "ghcr.io/stackhpc/kube-perftest:v0.1.0";

/* ============================= NAMESPACE ============================= */

pub fn generate_namespace() -> String {
    format!(
        r#"apiVersion: v1
kind: Namespace
metadata:
  name: {NAMESPACE}
  labels:
    app.kubernetes.io/name: {APP_NAME}
"#
    )
}

/* ============================= RBAC ============================= */

pub fn generate_service_account() -> String {
    format!(
        r#"apiVersion: v1
kind: ServiceAccount
metadata:
  name: {APP_NAME}
  namespace: {NAMESPACE}
  labels:
    app.kubernetes.io/name: {APP_NAME}
"#
    )
}

pub fn generate_cluster_role() -> String {
    format!(
        r#"apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {APP_NAME}
  labels:
    app.kubernetes.io/name: {APP_NAME}
rules:
  - apiGroups: ["perftest.stackhpc.com"]
    resources: ["iperfs", "mpipingpongs", "openfoams", "rdmabandwidths", "rdmalatencies", "fios", "pytorches", "benchmarksets"]
    verbs: ["get", "list", "watch", "patch"]
  - apiGroups: ["perftest.stackhpc.com"]
    resources: ["iperfs/status", "mpipingpongs/status", "openfoams/status", "rdmabandwidths/status", "rdmalatencies/status", "fios/status", "pytorches/status", "benchmarksets/status"]
    verbs: ["patch"]
  - apiGroups: ["batch.volcano.sh"]
    resources: ["jobs"]
    verbs: ["get", "list", "watch", "create", "patch"]
  - apiGroups: ["scheduling.k8s.io"]
    resources: ["priorityclasses"]
    verbs: ["get", "create", "patch", "delete"]
  - apiGroups: [""]
    resources: ["pods", "pods/log"]
    verbs: ["get", "list", "watch"]
  - apiGroups: [""]
    resources: ["services", "configmaps", "persistentvolumeclaims"]
    verbs: ["get", "list", "create", "patch"]
"#
    )
}

pub fn generate_cluster_role_binding() -> String {
    format!(
        r#"apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {APP_NAME}
  labels:
    app.kubernetes.io/name: {APP_NAME}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {APP_NAME}
subjects:
  - kind: ServiceAccount
    name: {APP_NAME}
    namespace: {NAMESPACE}
"#
    )
}

/* ============================= DEPLOYMENT ============================= */

pub fn generate_deployment_reconcile() -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {APP_NAME}-reconcile
  namespace: {NAMESPACE}
  labels:
    app.kubernetes.io/name: {APP_NAME}
    app.kubernetes.io/component: reconcile
spec:
  replicas: 1
  selector:
    matchLabels:
      app.kubernetes.io/name: {APP_NAME}
      app.kubernetes.io/component: reconcile
  template:
    metadata:
      labels:
        app.kubernetes.io/name: {APP_NAME}
        app.kubernetes.io/component: reconcile
    spec:
      serviceAccountName: {APP_NAME}
      containers:
        - name: {APP_NAME}
          image: {IMAGE}
          imagePullPolicy: IfNotPresent
          args:
            - "reconcile"
          ports:
            - containerPort: 9090
              protocol: TCP
          livenessProbe:
            httpGet:
              path: /healthz
              port: 9090
              scheme: HTTP
            initialDelaySeconds: 5
            periodSeconds: 10
          readinessProbe:
            httpGet:
              path: /readyz
              port: 9090
              scheme: HTTP
            initialDelaySeconds: 3
            periodSeconds: 5
          resources:
            requests:
              memory: "64Mi"
              cpu: "100m"
            limits:
              memory: "256Mi"
              cpu: "500m"
          securityContext:
            runAsNonRoot: true
            readOnlyRootFilesystem: true
"#
    )
}

pub fn generate_pdb_reconcile() -> String {
    format!(
        r#"apiVersion: policy/v1
kind: PodDisruptionBudget
metadata:
  name: {APP_NAME}-reconcile
  namespace: {NAMESPACE}
  labels:
    app.kubernetes.io/name: {APP_NAME}
    app.kubernetes.io/component: reconcile
spec:
  minAvailable: 1
  selector:
    matchLabels:
      app.kubernetes.io/name: {APP_NAME}
      app.kubernetes.io/component: reconcile
"#
    )
}

/* ============================= AGGREGATORS ============================= */

pub fn generate_rbac() -> String {
    [
        generate_service_account(),
        generate_cluster_role(),
        generate_cluster_role_binding(),
    ]
    .join("---\n")
}

pub fn generate_all() -> String {
    [
        generate_namespace(),
        generate_service_account(),
        generate_cluster_role(),
        generate_cluster_role_binding(),
        generate_deployment_reconcile(),
        generate_pdb_reconcile(),
    ]
    .join("---\n")
}

/* ============================= TESTS ============================= */
