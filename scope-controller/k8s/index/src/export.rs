use std::collections::BTreeSet;

/// The namespaces that a resource is visible to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportTo {
    public: bool,
    namespaces: BTreeSet<String>,
}

impl ExportTo {
    const PUBLIC: &'static str = "*";
    const PRIVATE: &'static str = ".";
    const NONE: &'static str = "~";

    /// A resource visible from every namespace.
    pub fn public() -> Self {
        Self {
            public: true,
            namespaces: BTreeSet::new(),
        }
    }

    /// Reads a resource's `exportTo` list. `.` refers to the resource's own namespace and `~`
    /// hides the resource from every namespace. An empty list exports the resource publicly.
    pub fn from_list<'s>(namespace: &str, exports: impl IntoIterator<Item = &'s str>) -> Self {
        let mut export = Self::default();
        let mut empty = true;
        for e in exports.into_iter().map(str::trim).filter(|e| !e.is_empty()) {
            empty = false;
            match e {
                Self::PUBLIC => export.public = true,
                Self::PRIVATE => {
                    export.namespaces.insert(namespace.to_string());
                }
                Self::NONE => {}
                ns => {
                    export.namespaces.insert(ns.to_string());
                }
            }
        }
        if empty {
            return Self::public();
        }
        export
    }

    /// Reads a comma-separated `exportTo` annotation.
    pub fn from_annotation(namespace: &str, annotation: Option<&str>) -> Self {
        match annotation {
            Some(value) => Self::from_list(namespace, value.split(',')),
            None => Self::public(),
        }
    }

    pub fn is_visible_to(&self, namespace: &str) -> bool {
        self.public || self.namespaces.contains(namespace)
    }
}
