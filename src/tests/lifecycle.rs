// Lifecycle Tests
// Initialization, signed transactions and the classification of their outcomes

#[cfg(test)]
mod lifecycle_tests {
    use crate::code::jar::{ClassDefinition, FieldDefinition, MemberFlags};
    use crate::code::JarManifest;
    use crate::codec::{self, selectors};
    use crate::crypto::KeyPair;
    use crate::node::{ContractOutcome, TransactionError};
    use crate::tests::*;
    use crate::types::*;
    use num_bigint::BigInt;

    // ===== HELPER FUNCTIONS =====

    fn expect_rejected<T: std::fmt::Debug>(result: Result<T, TransactionError>) -> String {
        match result {
            Err(TransactionError::Rejected(reason)) => reason,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    fn expect_failed<T: std::fmt::Debug>(
        result: Result<T, TransactionError>,
    ) -> (Option<TransactionReference>, FailureCause) {
        match result {
            Err(TransactionError::Failed { reference, cause }) => (reference, cause),
            other => panic!("expected a failure, got {:?}", other),
        }
    }

    fn nonce_of(chain: &Chain, account: &StorageReference) -> BigInt {
        chain
            .node
            .state_of(account)
            .unwrap()
            .iter()
            .find_map(|update| match update {
                Update::OfBigInteger { field, value, .. } if *field == FieldSignature::eoa_nonce() => {
                    Some(value.clone())
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    fn get() -> MethodSignature {
        counter_method("get", vec![], Some(BasicType::Int.into()))
    }

    fn contract_balance() -> MethodSignature {
        MethodSignature::new(classes::CONTRACT, "balance", vec![], Some(StorageType::big_integer()))
    }

    // ===== INITIALIZATION =====

    #[test]
    fn test_initial_transactions_only_before_initialization() {
        let mut chain = Chain::new();
        assert!(!chain.node.is_initialized().unwrap());

        chain.new_counter();
        assert!(chain.node.is_initialized().unwrap());

        let tail = chain.node.tail().unwrap();
        expect_rejected(chain.node.add_jar_store_initial_transaction(
            JarStoreInitialTransactionRequest {
                jar: demo_manifest().to_bytes().unwrap(),
                dependencies: vec![chain.kernel],
            },
        ));
        expect_rejected(chain.node.add_gamete_creation_transaction(
            GameteCreationTransactionRequest {
                classpath: chain.kernel,
                initial_amount: BigInt::from(5),
                public_key: chain.keys.public_key(),
            },
        ));
        assert_eq!(chain.node.tail().unwrap(), tail);
    }

    #[test]
    fn test_gamete_holds_the_initial_coins() {
        let chain = Chain::new();
        let tag = chain.node.class_tag_of(&chain.gamete).unwrap();
        assert!(matches!(
            tag,
            Update::ClassTag { ref class_name, jar, .. } if class_name == classes::EOA && jar == chain.kernel
        ));
        assert_eq!(chain.balance_of(&chain.gamete), BigInt::from(INITIAL_COINS));
        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(0));
    }

    #[test]
    fn test_negative_gamete_is_rejected() {
        let chain = Chain::new();
        let tail = chain.node.tail().unwrap();
        let reason = expect_rejected(chain.node.add_gamete_creation_transaction(
            GameteCreationTransactionRequest {
                classpath: chain.kernel,
                initial_amount: BigInt::from(-1),
                public_key: chain.keys.public_key(),
            },
        ));
        assert!(reason.contains("negative"));
        assert_eq!(chain.node.tail().unwrap(), tail);
    }

    // ===== SUCCESSFUL TRANSACTIONS =====

    #[test]
    fn test_constructor_call_creates_counter() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let position = chain.node.tail().unwrap().unwrap();
        assert_eq!(counter, StorageReference::new(position, 0));

        let response = chain.response_at(position);
        let gas = match &response {
            TransactionResponse::ConstructorCallSuccessful {
                new_object,
                updates,
                gas,
                ..
            } => {
                assert_eq!(*new_object, counter);
                assert!(updates.iter().any(|u| u.is_class_tag() && u.object() == counter));
                assert!(updates.iter().any(|u| u.is_for(&counter, &count_field())));
                *gas
            }
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(1));
        assert_eq!(
            chain.balance_of(&chain.gamete),
            BigInt::from(INITIAL_COINS - gas.total() * GAS_PRICE)
        );
    }

    #[test]
    fn test_method_call_logs_only_modified_fields() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();

        let outcome = chain.call(counter, counter_method("increment", vec![], None), vec![]);
        assert_eq!(outcome, Ok(ContractOutcome::Returned(None)));

        let response = chain.response_at(chain.node.tail().unwrap().unwrap());
        let counter_updates: Vec<&Update> = response
            .updates()
            .unwrap()
            .iter()
            .filter(|u| u.object() == counter)
            .collect();
        assert_eq!(counter_updates.len(), 1);
        assert_eq!(counter_updates[0].value(), Some(StorageValue::Int(1)));

        assert_eq!(chain.read(counter, get()), Some(StorageValue::Int(1)));
    }

    #[test]
    fn test_static_method_call() {
        let mut chain = Chain::new();
        let twice = MethodSignature::new(
            COUNTER,
            "twice",
            vec![BasicType::Int.into()],
            Some(BasicType::Int.into()),
        );
        let request = match chain.sign(StaticMethodCallTransactionRequest {
            caller: chain.caller(),
            method: twice.clone(),
            actuals: vec![StorageValue::Int(21)],
            signature: vec![],
        }) {
            TransactionRequest::StaticMethodCall(r) => r,
            other => panic!("unexpected {:?}", other),
        };

        let ran = chain.node.run_static_method_call_transaction(request.clone()).unwrap();
        assert_eq!(ran, ContractOutcome::Returned(Some(StorageValue::Int(42))));

        let added = chain.node.add_static_method_call_transaction(request).unwrap();
        chain.committed();
        assert_eq!(added, ContractOutcome::Returned(Some(StorageValue::Int(42))));
    }

    #[test]
    fn test_events_are_logged_with_their_creator() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        chain
            .call(counter, counter_method("announce", vec![], None), vec![])
            .unwrap();

        let response = chain.response_at(chain.node.tail().unwrap().unwrap());
        assert_eq!(response.events().len(), 1);
        let event = response.events()[0];

        let state = chain.node.state_of(&event).unwrap();
        assert!(state.iter().any(|u| matches!(
            u,
            Update::ClassTag { class_name, .. } if class_name == NOTICE
        )));
        assert!(state.iter().any(|u| u.is_for(&event, &FieldSignature::event_creator())
            && u.value() == Some(StorageValue::Reference(counter))));
    }

    // ===== COINS =====

    #[test]
    fn test_drained_balance_reads_zero() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();

        chain
            .call(
                counter,
                counter_method("deposit", vec![StorageType::big_integer()], None),
                vec![StorageValue::BigInteger(BigInt::from(1_000))],
            )
            .unwrap();
        assert_eq!(chain.balance_of(&counter), BigInt::from(1_000));

        chain
            .call(counter, counter_method("drain", vec![], None), vec![])
            .unwrap();
        let drained_at = chain.node.tail().unwrap().unwrap();
        let response = chain.response_at(drained_at);
        let zero = response
            .updates()
            .unwrap()
            .iter()
            .find(|u| u.is_for(&counter, &FieldSignature::balance()))
            .unwrap();
        assert_eq!(zero.value(), Some(StorageValue::BigInteger(BigInt::from(0))));
        assert_eq!(codec::encode(zero, 0).unwrap()[0], selectors::BALANCE_TO_ZERO);

        // Later transactions do not touch the counter: the read must find the drain
        chain.new_counter();
        chain.new_counter();
        assert_eq!(
            chain.read(counter, contract_balance()),
            Some(StorageValue::BigInteger(BigInt::from(0)))
        );
    }

    // ===== REJECTIONS =====

    #[test]
    fn test_rejections_leave_the_chain_untouched() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let tail = chain.node.tail().unwrap();
        let increment = || counter_method("increment", vec![], None);

        let wrong_chain = CallerData {
            chain_id: "elsewhere".into(),
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(wrong_chain, counter, increment(), vec![]),
        ));
        assert!(reason.contains("chain id"));

        let replayed = CallerData {
            nonce: BigInt::from(0),
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(replayed, counter, increment(), vec![]),
        ));
        assert!(reason.contains("nonce"));

        let mut forged = chain.method_request(chain.caller(), counter, increment(), vec![]);
        let stranger = KeyPair::from_seed(&[9; 32]);
        forged.signature = stranger.sign(b"something else");
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(forged));
        assert!(reason.contains("signature"));

        let starved = CallerData {
            gas_limit: 10,
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(starved, counter, increment(), vec![]),
        ));
        assert!(reason.contains("below the minimum"));

        let greedy = CallerData {
            gas_limit: chain.node.config().max_gas_per_transaction + 1,
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(greedy, counter, increment(), vec![]),
        ));
        assert!(reason.contains("exceeds"));

        let free = CallerData {
            gas_price: 0,
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(free, counter, increment(), vec![]),
        ));
        assert!(reason.contains("gas price"));

        let expensive = CallerData {
            gas_price: 10_000,
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(expensive, counter, increment(), vec![]),
        ));
        assert!(reason.contains("cannot pay"));

        let not_an_account = CallerData {
            caller: counter,
            ..chain.caller()
        };
        let reason = expect_rejected(chain.node.add_instance_method_call_transaction(
            chain.method_request(not_an_account, counter, increment(), vec![]),
        ));
        assert!(reason.contains("externally owned"));

        assert_eq!(chain.node.tail().unwrap(), tail);
        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(1));
    }

    // ===== FAILURES =====

    #[test]
    fn test_out_of_gas_charges_the_whole_limit() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let before = chain.balance_of(&chain.gamete);

        let (reference, cause) =
            expect_failed(chain.call(counter, counter_method("burn", vec![], None), vec![]));
        assert_eq!(cause.class_name, "OutOfGasError");
        let position = reference.unwrap();
        assert_eq!(chain.node.tail().unwrap(), Some(position));

        match chain.response_at(position) {
            TransactionResponse::MethodCallFailed {
                updates,
                gas,
                penalty,
                ..
            } => {
                assert_eq!(gas.total() + penalty, GAS_LIMIT);
                assert!(updates.iter().all(|u| u.object() == chain.gamete));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.balance_of(&chain.gamete), before - BigInt::from(GAS_LIMIT * GAS_PRICE));
        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(2));
    }

    #[test]
    fn test_exhausted_sub_budget_fails_without_the_whole_limit() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();

        let (reference, cause) = expect_failed(chain.call(
            counter,
            counter_method("burnWithin", vec![], None),
            vec![],
        ));
        assert_eq!(cause.class_name, "OutOfGasError");

        match chain.response_at(reference.unwrap()) {
            TransactionResponse::MethodCallFailed { gas, penalty, .. } => {
                assert!(gas.cpu >= 20_000);
                assert!(gas.total() < GAS_LIMIT / 2);
                assert_eq!(gas.total() + penalty, GAS_LIMIT);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_receiver_without_class_tag_fails_after_payment() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let before = chain.balance_of(&chain.gamete);
        let tail = chain.node.tail().unwrap().unwrap();

        // Jar installations have no updates, creations have no such progressive
        let receivers = [
            StorageReference::new(chain.kernel, 0),
            StorageReference::new(counter.transaction, 99),
        ];
        for (n, receiver) in receivers.into_iter().enumerate() {
            let (reference, cause) = expect_failed(chain.call(
                receiver,
                counter_method("increment", vec![], None),
                vec![],
            ));
            assert_eq!(cause.class_name, "DeserializationError");

            let position = reference.unwrap();
            assert_eq!(position.number(), tail.number() + 1 + n as u64);
            assert_eq!(chain.node.tail().unwrap(), Some(position));
            match chain.response_at(position) {
                TransactionResponse::MethodCallFailed { gas, penalty, .. } => {
                    assert_eq!(gas.total() + penalty, GAS_LIMIT)
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(3));
        assert_eq!(
            chain.balance_of(&chain.gamete),
            before - BigInt::from(2 * GAS_LIMIT * GAS_PRICE)
        );
    }

    #[test]
    fn test_throwing_constructor_commits_only_the_caller() {
        let mut chain = Chain::new();
        let before = chain.balance_of(&chain.gamete);
        let request = match chain.sign(ConstructorCallTransactionRequest {
            caller: chain.caller(),
            constructor: pledge_constructor(),
            actuals: vec![StorageValue::Int(-5)],
            signature: vec![],
        }) {
            TransactionRequest::ConstructorCall(request) => request,
            other => panic!("unexpected {:?}", other),
        };

        let outcome = chain.node.add_constructor_call_transaction(request).unwrap();
        chain.committed();
        let position = chain.node.tail().unwrap().unwrap();
        match outcome {
            ContractOutcome::Threw(exception) => {
                assert_eq!(exception.class_name, REFUSED);
                assert_eq!(exception.reference, Some(position));
            }
            other => panic!("unexpected {:?}", other),
        }

        match chain.response_at(position) {
            TransactionResponse::ConstructorCallException { updates, events, gas, .. } => {
                assert!(events.is_empty());
                assert!(!updates.is_empty());
                assert!(updates.iter().all(|u| u.object() == chain.gamete && !u.is_class_tag()));
                assert_eq!(
                    chain.balance_of(&chain.gamete),
                    before - BigInt::from(gas.total() * GAS_PRICE)
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(chain.node.class_tag_of(&StorageReference::new(position, 0)).is_err());
        assert_eq!(nonce_of(&chain, &chain.gamete), BigInt::from(1));
    }

    #[test]
    fn test_undeclared_checked_exception_fails() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let (reference, cause) =
            expect_failed(chain.call(counter, counter_method("refuse", vec![], None), vec![]));
        assert!(reference.is_some());
        assert_eq!(cause.class_name, REFUSED);
    }

    #[test]
    fn test_view_method_with_side_effects_fails() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let sneaky = counter_method("sneaky", vec![], Some(BasicType::Int.into()));

        let (_, cause) = expect_failed(chain.call(counter, sneaky, vec![]));
        assert_eq!(cause.class_name, "SideEffectsInViewMethodException");
        assert_eq!(chain.read(counter, get()), Some(StorageValue::Int(0)));
    }

    #[test]
    fn test_run_calls_never_commit() {
        let mut chain = Chain::new();
        let counter = chain.new_counter();
        let tail = chain.node.tail().unwrap();

        // Nonce and signature are not checked by run calls
        let stale = CallerData {
            nonce: BigInt::from(42),
            ..chain.caller()
        };
        let request = InstanceMethodCallTransactionRequest {
            caller: stale.clone(),
            method: get(),
            receiver: counter,
            actuals: vec![],
            signature: vec![],
        };
        assert_eq!(
            chain.node.run_instance_method_call_transaction(request).unwrap(),
            ContractOutcome::Returned(Some(StorageValue::Int(0)))
        );

        let request = InstanceMethodCallTransactionRequest {
            caller: stale,
            method: counter_method("increment", vec![], None),
            receiver: counter,
            actuals: vec![],
            signature: vec![],
        };
        let (reference, cause) =
            expect_failed(chain.node.run_instance_method_call_transaction(request));
        assert_eq!(reference, None);
        assert_eq!(cause.class_name, "SideEffectsInViewMethodException");

        assert_eq!(chain.node.tail().unwrap(), tail);
        assert!(chain.node.response_at(tail.unwrap().next()).is_err());
    }

    // ===== JAR INSTALLATION =====

    fn jar_request(chain: &Chain, manifest: JarManifest) -> JarStoreTransactionRequest {
        match chain.sign(JarStoreTransactionRequest {
            caller: chain.caller(),
            jar: manifest.to_bytes().unwrap(),
            dependencies: vec![chain.demo],
            signature: vec![],
        }) {
            TransactionRequest::JarStore(r) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_jar_store_installs_verified_code() {
        let mut chain = Chain::new();
        let manifest = JarManifest::new(vec![ClassDefinition::new("extra.Marker", Some(BOX))
            .with_field(FieldDefinition::new("weight", BasicType::Long.into()))]);

        let position = chain
            .node
            .add_jar_store_transaction(jar_request(&chain, manifest.clone()))
            .unwrap();
        chain.committed();

        let response = chain.response_at(position);
        let (jar, dependencies, version) = response.installed_jar().unwrap();
        assert_eq!(JarManifest::from_bytes(jar).unwrap(), manifest);
        assert_eq!(dependencies, &[chain.demo]);
        assert_eq!(version, chain.node.config().verification_version);
        assert!(matches!(response, TransactionResponse::JarStoreSuccessful { .. }));
    }

    #[test]
    fn test_jar_store_failing_verification_is_committed() {
        let mut chain = Chain::new();
        let before = chain.balance_of(&chain.gamete);
        let clash = JarManifest::new(vec![ClassDefinition::new(COUNTER, Some(classes::CONTRACT))
            .with_constructor(vec![], MemberFlags::default())]);

        let (reference, cause) =
            expect_failed(chain.node.add_jar_store_transaction(jar_request(&chain, clash)));
        chain.committed();
        assert_eq!(cause.class_name, "VerificationError");

        let response = chain.response_at(reference.unwrap());
        assert!(matches!(response, TransactionResponse::JarStoreFailed { .. }));
        assert!(response.installed_jar().is_none());
        assert_eq!(chain.balance_of(&chain.gamete), before - BigInt::from(GAS_LIMIT * GAS_PRICE));
    }

    #[test]
    fn test_in_memory_node_with_trusted_signatures() {
        use crate::code::kernel;
        use crate::config::{ConsensusConfig, EngineConfig};
        use crate::crypto::AcceptAllVerifier;
        use crate::node::Node;
        use std::sync::Arc;

        let config = EngineConfig::in_memory(ConsensusConfig::testnet());
        let node = Node::open(&config, Arc::new(demo_registry()), Arc::new(AcceptAllVerifier)).unwrap();
        assert!(!node.is_initialized().unwrap());

        let kernel = node
            .add_jar_store_initial_transaction(JarStoreInitialTransactionRequest {
                jar: kernel::manifest().to_bytes().unwrap(),
                dependencies: vec![],
            })
            .unwrap();
        let demo = node
            .add_jar_store_initial_transaction(JarStoreInitialTransactionRequest {
                jar: demo_manifest().to_bytes().unwrap(),
                dependencies: vec![kernel],
            })
            .unwrap();
        let gamete = node
            .add_gamete_creation_transaction(GameteCreationTransactionRequest {
                classpath: kernel,
                initial_amount: BigInt::from(INITIAL_COINS),
                public_key: "unchecked".into(),
            })
            .unwrap();

        let outcome = node
            .add_constructor_call_transaction(ConstructorCallTransactionRequest {
                caller: CallerData {
                    caller: gamete,
                    nonce: BigInt::from(0),
                    chain_id: config.consensus.chain_id.clone(),
                    gas_limit: GAS_LIMIT,
                    gas_price: GAS_PRICE,
                    classpath: demo,
                },
                constructor: counter_constructor(),
                actuals: vec![],
                signature: vec![],
            })
            .unwrap();
        assert!(outcome.returned().is_some());
        assert!(node.is_initialized().unwrap());
    }
}
