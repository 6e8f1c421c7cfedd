use crate::batch::ReplaceTarget;
use std::collections::BTreeSet;

/// Records picked for replacement. Whether everything is selected is
/// derived from the set and the ids still pending, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the record is selected afterwards.
    pub fn toggle(&mut self, record_id: &str) -> bool {
        if self.selected.remove(record_id) {
            false
        } else {
            self.selected.insert(record_id.to_string());
            true
        }
    }

    pub fn select_all<'a, I>(&mut self, record_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.selected
            .extend(record_ids.into_iter().map(str::to_string));
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, record_id: &str) -> bool {
        self.selected.contains(record_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// True when every id in `known` is selected. Selected ids outside
    /// `known` never count towards it.
    pub fn all_selected<'a, I>(&self, known: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut any = false;
        for record_id in known {
            if !self.selected.contains(record_id) {
                return false;
            }
            any = true;
        }
        any
    }

    /// Selected ids among `known`, in the order of `known`.
    pub fn selected_among<'a, I>(&self, known: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        known
            .into_iter()
            .filter(|record_id| self.selected.contains(*record_id))
            .map(str::to_string)
            .collect()
    }

    pub fn target<'a, I>(&self, known: I) -> ReplaceTarget
    where
        I: IntoIterator<Item = &'a str>,
    {
        let known: Vec<&str> = known.into_iter().collect();
        if self.all_selected(known.iter().copied()) {
            ReplaceTarget::All
        } else {
            ReplaceTarget::Selected(self.selected_among(known))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDING: [&str; 3] = ["a", "b", "c"];

    #[test]
    fn all_selected_follows_the_set() {
        let mut selection = Selection::new();
        selection.select_all(PENDING);
        assert!(selection.all_selected(PENDING));
        assert_eq!(selection.target(PENDING), ReplaceTarget::All);

        assert!(!selection.toggle("b"));
        assert!(!selection.all_selected(PENDING));
        assert_eq!(
            selection.target(PENDING),
            ReplaceTarget::Selected(vec!["a".into(), "c".into()])
        );

        assert!(selection.toggle("b"));
        assert!(selection.all_selected(PENDING));
    }

    #[test]
    fn unknown_ids_never_widen_the_target() {
        let mut selection = Selection::new();
        selection.select_all(["r1", "typo"]);
        assert_eq!(selection.len(), 2);
        assert!(!selection.all_selected(["r1", "r2"]));
        assert_eq!(
            selection.target(["r1", "r2"]),
            ReplaceTarget::Selected(vec!["r1".into()])
        );

        selection.select_all(["r2"]);
        assert_eq!(selection.target(["r1", "r2"]), ReplaceTarget::All);
    }

    #[test]
    fn empty_selection_is_never_all() {
        let mut selection = Selection::new();
        assert!(!selection.all_selected([]));
        selection.select_all(["a"]);
        assert!(!selection.all_selected([]));
        selection.clear();
        assert!(selection.is_empty());
        assert!(!selection.is_selected("a"));
        assert_eq!(selection.target(["a", "b"]), ReplaceTarget::Selected(vec![]));
    }
}
