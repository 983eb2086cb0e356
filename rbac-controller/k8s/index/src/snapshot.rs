use ahash::AHashMap as HashMap;
use rbac_controller_core::{
    catalog::{ClusterRoleBinding, RoleBinding},
    BindingRef, Catalog, RoleRef, Scope, Subject,
};

/// An immutable catalog along with the indexes used to query it.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub(crate) catalog: Catalog,

    /// Maps each subject to the bindings that name it, in catalog order.
    subjects: HashMap<Subject, Vec<BindingId>>,

    /// Counts RoleBindings by `(namespace, roleRef.name)`.
    role_refs: HashMap<(String, String), usize>,

    /// Counts ClusterRoleBindings by `roleRef.name`.
    cluster_role_refs: HashMap<String, usize>,
}

/// Locates a binding in the catalog.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BindingId {
    Namespaced(usize),
    Cluster(usize),
}

/// A borrowed binding of either kind.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Binding<'c> {
    Namespaced(&'c RoleBinding),
    Cluster(&'c ClusterRoleBinding),
}

// === impl Snapshot ===

impl Snapshot {
    pub fn new(catalog: Catalog) -> Self {
        let mut subjects = HashMap::<_, Vec<_>>::default();
        let mut role_refs = HashMap::default();
        let mut cluster_role_refs = HashMap::default();

        for (i, rb) in catalog.role_bindings.iter().enumerate() {
            // Duplicate subjects each contribute a reference.
            for subject in &rb.subjects {
                subjects
                    .entry(subject.clone())
                    .or_default()
                    .push(BindingId::Namespaced(i));
            }
            *role_refs
                .entry((rb.namespace.clone(), rb.role_ref.name.clone()))
                .or_insert(0) += 1;
        }

        for (i, crb) in catalog.cluster_role_bindings.iter().enumerate() {
            for subject in &crb.subjects {
                subjects
                    .entry(subject.clone())
                    .or_default()
                    .push(BindingId::Cluster(i));
            }
            *cluster_role_refs
                .entry(crb.role_ref.name.clone())
                .or_insert(0) += 1;
        }

        tracing::debug!(
            roles = catalog.roles.len(),
            cluster_roles = catalog.cluster_roles.len(),
            role_bindings = catalog.role_bindings.len(),
            cluster_role_bindings = catalog.cluster_role_bindings.len(),
            subjects = subjects.len(),
            "indexed catalog"
        );

        Self {
            catalog,
            subjects,
            role_refs,
            cluster_role_refs,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns true if the subject is named by at least one binding.
    pub fn is_bound(&self, subject: &Subject) -> bool {
        self.subjects.contains_key(subject)
    }

    /// Lists the bindings that name the subject, in catalog order.
    pub fn bindings_for(&self, subject: &Subject) -> Vec<BindingRef> {
        self.bindings(subject).map(|b| b.reference()).collect()
    }

    /// Returns true iff some RoleBinding in `namespace` references `name`.
    ///
    /// Activity is name-based: a binding referencing a ClusterRole with the same name as the Role
    /// also counts.
    pub fn is_role_active(&self, name: &str, namespace: &str) -> bool {
        self.role_refs
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Returns true iff some ClusterRoleBinding references `name`.
    ///
    /// RoleBindings that reference the ClusterRole do not make it active. They are listed by
    /// [`Snapshot::cluster_role_references`].
    pub fn is_cluster_role_active(&self, name: &str) -> bool {
        self.cluster_role_refs.contains_key(name)
    }

    /// Lists every binding, of either kind, whose roleRef names the ClusterRole.
    pub fn cluster_role_references(&self, name: &str) -> Vec<BindingRef> {
        let namespaced = self
            .catalog
            .role_bindings
            .iter()
            .filter(|rb| rb.role_ref == RoleRef::cluster_role(name))
            .map(Binding::Namespaced);
        let cluster = self
            .catalog
            .cluster_role_bindings
            .iter()
            .filter(|crb| crb.role_ref.name == name)
            .map(Binding::Cluster);
        namespaced.chain(cluster).map(|b| b.reference()).collect()
    }

    pub(crate) fn bindings<'s>(
        &'s self,
        subject: &Subject,
    ) -> impl Iterator<Item = Binding<'s>> + 's {
        self.subjects
            .get(subject)
            .into_iter()
            .flatten()
            .filter_map(move |id| match *id {
                BindingId::Namespaced(i) => self.catalog.role_bindings.get(i).map(Binding::Namespaced),
                BindingId::Cluster(i) => {
                    self.catalog.cluster_role_bindings.get(i).map(Binding::Cluster)
                }
            })
    }
}

impl From<Catalog> for Snapshot {
    fn from(catalog: Catalog) -> Self {
        Self::new(catalog)
    }
}

// === impl Binding ===

impl<'c> Binding<'c> {
    pub(crate) fn role_ref(&self) -> &'c RoleRef {
        match self {
            Self::Namespaced(rb) => &rb.role_ref,
            Self::Cluster(crb) => &crb.role_ref,
        }
    }

    pub(crate) fn reference(&self) -> BindingRef {
        match self {
            Self::Namespaced(rb) => BindingRef::RoleBinding {
                namespace: rb.namespace.clone(),
                name: rb.name.clone(),
            },
            Self::Cluster(crb) => BindingRef::ClusterRoleBinding {
                name: crb.name.clone(),
            },
        }
    }

    pub(crate) fn scope(&self) -> Scope {
        match self {
            Self::Namespaced(rb) => Scope::Namespace(rb.namespace.clone()),
            Self::Cluster(_) => Scope::Cluster,
        }
    }

    pub(crate) fn namespace(&self) -> Option<&'c str> {
        match self {
            Self::Namespaced(rb) => Some(&rb.namespace),
            Self::Cluster(_) => None,
        }
    }
}
