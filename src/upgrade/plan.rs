use crate::manifest::Version;

/// How a manifest relates to a product's recorded version.
#[derive(Debug, Clone, Copy)]
pub enum Reconciliation<'m> {
    /// The recorded version is not declared in the manifest.
    Incompatible,
    /// `existing` ends with the recorded version; `pending` is everything after it.
    Plan {
        existing: &'m [Version],
        pending: &'m [Version],
    },
}

impl Reconciliation<'_> {
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Incompatible)
    }
}

/// Split `versions` around `recorded`. The first version with a matching
/// name wins; the manifest is expected to have been checked for duplicates.
pub fn reconcile<'m>(versions: &'m [Version], recorded: Option<&str>) -> Reconciliation<'m> {
    let Some(recorded) = recorded else {
        return Reconciliation::Plan {
            existing: &[],
            pending: versions,
        };
    };

    let mut position = None;
    for (idx, version) in versions.iter().enumerate() {
        if version.name() == recorded {
            position = Some(idx);
            break;
        }
    }

    match position {
        Some(idx) => {
            let (existing, pending) = versions.split_at(idx + 1);
            Reconciliation::Plan { existing, pending }
        }
        None => Reconciliation::Incompatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestBuilder;

    fn names(versions: &[Version]) -> Vec<&str> {
        versions.iter().map(|v| v.name()).collect()
    }

    fn manifest(versions: &[&str]) -> crate::manifest::Manifest {
        versions
            .iter()
            .fold(ManifestBuilder::new("app"), |builder, name| {
                builder.version(name, [("task", "SELECT 1")])
            })
            .build()
    }

    #[test]
    fn test_nothing_recorded_means_everything_pending() {
        let manifest = manifest(&["1.0.0", "1.0.1"]);
        match reconcile(manifest.versions(), None) {
            Reconciliation::Plan { existing, pending } => {
                assert!(existing.is_empty());
                assert_eq!(names(pending), vec!["1.0.0", "1.0.1"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recorded_in_the_middle() {
        let manifest = manifest(&["1.0.0", "1.0.1", "1.1.0"]);
        match reconcile(manifest.versions(), Some("1.0.1")) {
            Reconciliation::Plan { existing, pending } => {
                assert_eq!(names(existing), vec!["1.0.0", "1.0.1"]);
                assert_eq!(names(pending), vec!["1.1.0"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recorded_last_is_up_to_date() {
        let manifest = manifest(&["1.0.0", "1.0.1"]);
        match reconcile(manifest.versions(), Some("1.0.1")) {
            Reconciliation::Plan { existing, pending } => {
                assert_eq!(existing.len(), 2);
                assert!(pending.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_recorded_is_incompatible() {
        let manifest = manifest(&["1.0.0"]);
        let plan = reconcile(manifest.versions(), Some("0.7.0"));
        assert!(plan.is_incompatible());
    }

    #[test]
    fn test_order_is_declaration_order() {
        let manifest = manifest(&["b", "a", "c"]);
        match reconcile(manifest.versions(), Some("a")) {
            Reconciliation::Plan { existing, pending } => {
                assert_eq!(names(existing), vec!["b", "a"]);
                assert_eq!(names(pending), vec!["c"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = manifest(&[]);
        assert!(matches!(
            reconcile(manifest.versions(), None),
            Reconciliation::Plan { existing: [], pending: [] }
        ));
        assert!(reconcile(manifest.versions(), Some("1.0.0")).is_incompatible());
    }
}
