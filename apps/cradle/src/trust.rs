use std::collections::HashSet;

/// Decides whether an answer's claimed `parentID` may complete the handshake.
pub trait TrustGate: Send + Sync {
    fn is_trusted(&self, parent_id: Option<&str>) -> bool;
}

impl<F> TrustGate for F
where
    F: Fn(Option<&str>) -> bool + Send + Sync,
{
    fn is_trusted(&self, parent_id: Option<&str>) -> bool {
        self(parent_id)
    }
}

/// Allowlist of parent ids. An answer without an id is never trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustedParents {
    ids: HashSet<String>,
}

impl TrustedParents {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(Into::into)
                .filter(|id: &String| !id.trim().is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl TrustGate for TrustedParents {
    fn is_trusted(&self, parent_id: Option<&str>) -> bool {
        parent_id.is_some_and(|id| self.ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_requires_a_known_id() {
        let gate = TrustedParents::new(["mum", "dad"]);
        assert!(gate.is_trusted(Some("mum")));
        assert!(!gate.is_trusted(Some("stranger")));
        assert!(!gate.is_trusted(None));
    }

    #[test]
    fn blank_ids_are_not_allowlisted() {
        let gate = TrustedParents::new(["", "  "]);
        assert!(gate.is_empty());
        assert!(!gate.is_trusted(Some("")));
    }

    #[test]
    fn closures_are_gates() {
        let gate = |id: Option<&str>| id.is_some_and(|id| id.starts_with("parent-"));
        assert!(gate.is_trusted(Some("parent-1")));
        assert!(!gate.is_trusted(Some("intruder")));
    }
}
