// Lazy Field Tests
// Backward walks over the log, final fields, exceptions that keep their updates

#[cfg(test)]
mod lazy_field_tests {
    use crate::node::{ContractOutcome, TransactionError};
    use crate::tests::*;
    use crate::types::*;

    // ===== HELPER FUNCTIONS =====

    fn label() -> MethodSignature {
        counter_method("label", vec![], Some(StorageType::string()))
    }

    fn store(chain: &mut Chain, counter: StorageReference, text: &str) -> TransactionReference {
        chain
            .call(
                counter,
                counter_method("store", vec![StorageType::string()], None),
                vec![StorageValue::String(text.into())],
            )
            .unwrap();
        chain.node.tail().unwrap().unwrap()
    }

    fn increment(chain: &mut Chain, counter: StorageReference) {
        chain
            .call(counter, counter_method("increment", vec![], None), vec![])
            .unwrap();
    }

    fn shelf_of(chain: &Chain, counter: &StorageReference) -> Option<StorageValue> {
        chain
            .node
            .state_of(counter)
            .unwrap()
            .iter()
            .find(|u| u.is_for(counter, &shelf_field()))
            .and_then(Update::value)
    }

    // ===== TEST 1: LAZY REFERENCES ACROSS POSITIONS =====

    #[test]
    fn test_lazy_reference_is_found_behind_later_updates() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let stored_at = store(&mut chain, counter, "apples");
        increment(&mut chain, counter);
        increment(&mut chain, counter);

        let boxed = StorageReference::new(stored_at, 0);
        assert_eq!(shelf_of(&chain, &counter), Some(StorageValue::Reference(boxed)));
        assert_eq!(chain.read(counter, label()), Some(StorageValue::String("apples".into())));
    }

    #[test]
    fn test_latest_lazy_reference_wins() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let first = store(&mut chain, counter, "apples");
        let second = store(&mut chain, counter, "pears");

        assert_eq!(chain.read(counter, label()), Some(StorageValue::String("pears".into())));
        assert_eq!(
            shelf_of(&chain, &counter),
            Some(StorageValue::Reference(StorageReference::new(second, 0)))
        );

        // The replaced box keeps its own state
        let old_box = StorageReference::new(first, 0);
        let state = chain.node.state_of(&old_box).unwrap();
        assert!(state
            .iter()
            .any(|u| u.is_for(&old_box, &label_field())
                && u.value() == Some(StorageValue::String("apples".into()))));
    }

    #[test]
    fn test_empty_lazy_field_is_null() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        assert_eq!(shelf_of(&chain, &counter), Some(StorageValue::Null));

        let request = InstanceMethodCallTransactionRequest {
            caller: chain.caller(),
            method: label(),
            receiver: counter,
            actuals: vec![],
            signature: vec![],
        };
        match chain.node.run_instance_method_call_transaction(request) {
            Err(TransactionError::Failed { cause, .. }) => {
                assert_eq!(cause.class_name, "NullPointerException")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // ===== TEST 2: FINAL FIELDS =====

    #[test]
    fn test_final_field_of_stored_object_is_immutable() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        store(&mut chain, counter, "apples");

        let outcome = chain.call(
            counter,
            counter_method("relabel", vec![StorageType::string()], None),
            vec![StorageValue::String("pears".into())],
        );
        match outcome {
            Err(TransactionError::Failed { reference, cause }) => {
                assert!(reference.is_some());
                assert_eq!(cause.class_name, "IllegalAccessError");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.read(counter, label()), Some(StorageValue::String("apples".into())));
    }

    // ===== TEST 3: EXCEPTIONS KEEP THEIR UPDATES =====

    #[test]
    fn test_declared_exception_commits_lazy_update() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();

        let outcome = chain
            .call(
                counter,
                counter_method("storeAndRefuse", vec![StorageType::string()], None),
                vec![StorageValue::String("plums".into())],
            )
            .unwrap();
        let position = chain.node.tail().unwrap().unwrap();
        match outcome {
            ContractOutcome::Threw(exception) => {
                assert_eq!(exception.reference, Some(position));
                assert_eq!(exception.class_name, REFUSED);
                assert!(exception.call_site.contains("storeAndRefuse"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let boxed = StorageReference::new(position, 0);
        match chain.response_at(position) {
            TransactionResponse::MethodCallException { updates, .. } => {
                assert!(updates.iter().any(|u| u.is_for(&counter, &shelf_field())
                    && u.value() == Some(StorageValue::Reference(boxed))));
                assert!(updates.iter().any(|u| u.is_class_tag() && u.object() == boxed));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.read(counter, label()), Some(StorageValue::String("plums".into())));
    }

    // ===== TEST 4: HISTORY INDEX =====

    #[test]
    fn test_history_index_does_not_change_results() {
        let play = |index: bool| {
            let mut chain = Chain::with_index(index);
            let counter = chain.new_counter();
            store(&mut chain, counter, "apples");
            increment(&mut chain, counter);
            chain.new_counter();
            increment(&mut chain, counter);
            (
                chain.node.state_of(&counter).unwrap(),
                chain.read(counter, label()),
                chain.read(counter, counter_method("get", vec![], Some(BasicType::Int.into()))),
            )
        };

        let (indexed_state, indexed_label, indexed_count) = play(true);
        let (walked_state, walked_label, walked_count) = play(false);
        assert_eq!(indexed_state, walked_state);
        assert_eq!(indexed_label, walked_label);
        assert_eq!(indexed_count, Some(StorageValue::Int(2)));
        assert_eq!(indexed_count, walked_count);
    }
}
