use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        autoscaling::v2::HorizontalPodAutoscaler,
        batch::v1::Job,
        core::v1::{ConfigMap, Namespace, Node, Pod, Secret, Service},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use std::{collections::BTreeMap, sync::Arc};

pub type Map = BTreeMap<String, String>;

/// A shared, immutable label mapping.
#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

/// An object that exposes a label mapping.
///
/// Selectors only ever look labels up by key, so implementors don't need to
/// materialize a [`Map`]. A missing label mapping reads the same as an empty
/// one.
pub trait Labeled {
    /// Returns the value of the label `key`, if it is set.
    ///
    /// An empty string is a set value.
    fn label(&self, key: &str) -> Option<&str>;

    /// Returns true when there is no object at all (e.g. a JSON `null`).
    ///
    /// Nullish objects never match a selector.
    #[inline]
    fn is_nullish(&self) -> bool {
        false
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === impl Labeled ===

impl Labeled for Map {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl Labeled for Labels {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        self.0.label(key)
    }
}

impl Labeled for ObjectMeta {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.label(key)
    }
}

/// Reads `metadata.labels` from an untyped resource.
///
/// Label values that aren't strings are treated as unset.
impl Labeled for serde_json::Value {
    fn label(&self, key: &str) -> Option<&str> {
        self.get("metadata")?.get("labels")?.get(key)?.as_str()
    }

    #[inline]
    fn is_nullish(&self) -> bool {
        self.is_null()
    }
}

impl<T: Labeled> Labeled for Option<T> {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        self.as_ref()?.label(key)
    }

    #[inline]
    fn is_nullish(&self) -> bool {
        match self {
            Some(inner) => inner.is_nullish(),
            None => true,
        }
    }
}

impl<T: Labeled + ?Sized> Labeled for &T {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        (**self).label(key)
    }

    #[inline]
    fn is_nullish(&self) -> bool {
        (**self).is_nullish()
    }
}

impl<T: Labeled + ?Sized> Labeled for Arc<T> {
    #[inline]
    fn label(&self, key: &str) -> Option<&str> {
        (**self).label(key)
    }

    #[inline]
    fn is_nullish(&self) -> bool {
        (**self).is_nullish()
    }
}

macro_rules! impl_labeled_resource {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Labeled for $kind {
                #[inline]
                fn label(&self, key: &str) -> Option<&str> {
                    self.metadata.label(key)
                }
            }
        )+
    };
}

impl_labeled_resource!(
    ConfigMap,
    DaemonSet,
    Deployment,
    HorizontalPodAutoscaler,
    Job,
    Namespace,
    Node,
    Pod,
    ReplicaSet,
    Secret,
    Service,
    StatefulSet,
);
