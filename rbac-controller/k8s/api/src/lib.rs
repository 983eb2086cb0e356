#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod rbac;

pub use self::rbac::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
pub use k8s_openapi::api::{
    self,
    core::v1::{Namespace, ServiceAccount},
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, ResourceExt},
    Client, Resource,
};
