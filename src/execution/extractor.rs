// Extracteur - Mises à jour produites par une transaction
use super::runtime::{Heap, ObjectId, RuntimeValue, Slot};
use crate::types::Update;
use std::collections::{BTreeSet, HashSet};

/// Updates to log for the objects reachable from `roots`.
///
/// Objects created by the transaction get their class tag and every field;
/// stored objects get only the fields whose value changed. The result is
/// canonically sorted, whatever the order of `roots`.
pub fn extract_updates(heap: &Heap, roots: &[ObjectId]) -> BTreeSet<Update> {
    let mut updates = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut work: Vec<ObjectId> = roots.to_vec();

    while let Some(id) = work.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(object) = heap.get(id) else {
            continue;
        };

        if !object.in_storage {
            updates.insert(Update::ClassTag {
                object: object.reference,
                class_name: object.class_name.clone(),
                jar: object.jar,
            });
        }

        for field in &object.fields {
            let Slot::Loaded { old, current } = &field.slot else {
                continue;
            };

            if !field.eager {
                for value in [Some(current), old.as_ref()].into_iter().flatten() {
                    if let RuntimeValue::Object(target) = value {
                        work.push(*target);
                    }
                }
            }

            if object.in_storage && !field.is_modified() {
                continue;
            }
            if let Some(value) = heap.to_storage(current) {
                updates.insert(Update::of(
                    object.reference,
                    field.signature.clone(),
                    value,
                    field.eager,
                ));
            }
        }
    }

    updates
}
