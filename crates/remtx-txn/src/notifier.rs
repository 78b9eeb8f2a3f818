//! Per-transaction record of changed and disposed objects.

use remtx_types::ObjectHandle;

/// Collects the objects a unit of work changed or disposed, so the
/// presentation layer can refresh them when the transaction ends.
///
/// Each object appears at most once per list, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct UpdateNotifier {
    changed: Vec<ObjectHandle>,
    disposed: Vec<ObjectHandle>,
}

impl UpdateNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the object was already recorded as changed.
    pub fn add_changed(&mut self, object: ObjectHandle) -> bool {
        push_unique(&mut self.changed, object)
    }

    /// Returns `false` if the object was already recorded as disposed.
    pub fn add_disposed(&mut self, object: ObjectHandle) -> bool {
        push_unique(&mut self.disposed, object)
    }

    #[must_use]
    pub fn changed(&self) -> &[ObjectHandle] {
        &self.changed
    }

    #[must_use]
    pub fn disposed(&self) -> &[ObjectHandle] {
        &self.disposed
    }

    #[must_use]
    pub fn is_disposed(&self, object: &ObjectHandle) -> bool {
        self.disposed.iter().any(|d| d.same_object(object))
    }
}

fn push_unique(list: &mut Vec<ObjectHandle>, object: ObjectHandle) -> bool {
    if list.iter().any(|existing| existing.same_object(&object)) {
        return false;
    }
    list.push(object);
    true
}
