// Gas - Comptage des ressources d'une transaction
use crate::types::GasConsumed;
use serde::{Deserialize, Serialize};

/// Coûts en gas standard des opérations
pub mod costs {
    // Transactions
    pub const BASE_TRANSACTION: u64 = 1_000;
    pub const PER_REQUEST_BYTE: u64 = 1;

    // Lecture du journal
    pub const RESPONSE_READ: u64 = 50;

    // Exécution
    pub const FIELD_READ: u64 = 2;
    pub const FIELD_WRITE: u64 = 4;
    pub const METHOD_CALL: u64 = 20;

    // Mémoire
    pub const OBJECT_ALLOCATION: u64 = 16;
    pub const FIELD_ALLOCATION: u64 = 4;

    // Stockage (par byte écrit dans le journal)
    pub const STORAGE_BYTE: u64 = 1;

    // Installation de code (par byte)
    pub const JAR_CPU_BYTE: u64 = 1;
    pub const JAR_RAM_BYTE: u64 = 1;
}

/// Gas cost of each metered operation. Part of the consensus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasCostModel {
    pub base_transaction: u64,
    pub per_request_byte: u64,
    pub response_read: u64,
    pub field_read: u64,
    pub field_write: u64,
    pub method_call: u64,
    pub object_allocation: u64,
    pub field_allocation: u64,
    pub storage_byte: u64,
    pub jar_cpu_byte: u64,
    pub jar_ram_byte: u64,
}

impl GasCostModel {
    pub fn standard() -> Self {
        Self {
            base_transaction: costs::BASE_TRANSACTION,
            per_request_byte: costs::PER_REQUEST_BYTE,
            response_read: costs::RESPONSE_READ,
            field_read: costs::FIELD_READ,
            field_write: costs::FIELD_WRITE,
            method_call: costs::METHOD_CALL,
            object_allocation: costs::OBJECT_ALLOCATION,
            field_allocation: costs::FIELD_ALLOCATION,
            storage_byte: costs::STORAGE_BYTE,
            jar_cpu_byte: costs::JAR_CPU_BYTE,
            jar_ram_byte: costs::JAR_RAM_BYTE,
        }
    }

    /// Storage gas for `bytes` bytes written to the log
    pub fn storage_for(&self, bytes: u64) -> u64 {
        bytes.saturating_mul(self.storage_byte)
    }

    pub fn ram_for_object(&self, fields: usize) -> u64 {
        self.object_allocation
            .saturating_add(self.field_allocation.saturating_mul(fields as u64))
    }
}

impl Default for GasCostModel {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy)]
enum Category {
    Cpu,
    Ram,
    Storage,
}

/// Per-transaction gas meter.
///
/// A negative `remaining` means unmetered: every charge succeeds without
/// effect. Sub-budgets nest on a stack; the unspent part of a sub-budget
/// flows back to the enclosing budget when it is left.
#[derive(Debug, Clone)]
pub struct GasMeter {
    remaining: i128,
    stack: Vec<i128>,
    consumed_cpu: u64,
    consumed_ram: u64,
    consumed_storage: u64,
}

impl GasMeter {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            remaining: gas_limit as i128,
            stack: Vec::new(),
            consumed_cpu: 0,
            consumed_ram: 0,
            consumed_storage: 0,
        }
    }

    /// Meter for system transactions that are not paid by anybody
    pub fn unmetered() -> Self {
        Self {
            remaining: -1,
            ..Self::new(0)
        }
    }

    pub fn is_unmetered(&self) -> bool {
        self.remaining < 0
    }

    pub fn remaining(&self) -> i128 {
        self.remaining
    }

    /// Nesting depth of sub-budgets
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn charge_cpu(&mut self, amount: u64) -> Result<(), GasError> {
        self.charge(amount, Category::Cpu)
    }

    pub fn charge_ram(&mut self, amount: u64) -> Result<(), GasError> {
        self.charge(amount, Category::Ram)
    }

    pub fn charge_storage(&mut self, amount: u64) -> Result<(), GasError> {
        self.charge(amount, Category::Storage)
    }

    fn charge(&mut self, amount: u64, category: Category) -> Result<(), GasError> {
        if self.is_unmetered() {
            return Ok(());
        }
        self.reserve(amount)?;

        let counter = match category {
            Category::Cpu => &mut self.consumed_cpu,
            Category::Ram => &mut self.consumed_ram,
            Category::Storage => &mut self.consumed_storage,
        };
        *counter = counter.saturating_add(amount);

        Ok(())
    }

    fn reserve(&mut self, amount: u64) -> Result<(), GasError> {
        if self.remaining < amount as i128 {
            return Err(GasError::OutOfGas {
                needed: amount,
                remaining: self.remaining.max(0) as u64,
            });
        }
        self.remaining -= amount as i128;
        Ok(())
    }

    /// Takes `amount` from the current budget and makes it the whole budget
    /// until the matching `leave_budget`
    pub fn enter_budget(&mut self, amount: u64) -> Result<(), GasError> {
        if self.is_unmetered() {
            self.stack.push(self.remaining);
            return Ok(());
        }
        self.reserve(amount)?;
        self.stack.push(self.remaining);
        self.remaining = amount as i128;
        Ok(())
    }

    /// Restores the enclosing budget, giving back what is left of the current one
    pub fn leave_budget(&mut self) {
        if let Some(outer) = self.stack.pop() {
            self.remaining = if outer < 0 {
                outer
            } else {
                outer + self.remaining
            };
        }
    }

    /// Runs `body` under a sub-budget of `amount`. The enclosing budget is
    /// restored on every exit path.
    pub fn with_budget<T, E, F>(&mut self, amount: u64, body: F) -> Result<T, E>
    where
        E: From<GasError>,
        F: FnOnce(&mut GasMeter) -> Result<T, E>,
    {
        self.enter_budget(amount)?;
        let result = body(self);
        self.leave_budget();
        result
    }

    pub fn consumed(&self) -> GasConsumed {
        GasConsumed {
            cpu: self.consumed_cpu,
            ram: self.consumed_ram,
            storage: self.consumed_storage,
        }
    }

    pub fn total_consumed(&self) -> u64 {
        self.consumed().total()
    }

    /// Gas of `gas_limit` neither consumed nor refunded
    pub fn penalty(&self, gas_limit: u64) -> u64 {
        gas_limit.saturating_sub(self.total_consumed())
    }

    /// Gas still available to the outermost budget
    pub fn unused(&self) -> u64 {
        let on_stack: i128 = self.stack.iter().filter(|g| **g >= 0).sum();
        (self.remaining.max(0) + on_stack).max(0) as u64
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GasError {
    #[error("Out of gas: needed {needed}, remaining {remaining}")]
    OutOfGas { needed: u64, remaining: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gas_meter_charges_categories() {
        let mut meter = GasMeter::new(100);
        meter.charge_cpu(30).unwrap();
        meter.charge_ram(20).unwrap();
        meter.charge_storage(10).unwrap();

        assert_eq!(meter.remaining(), 40);
        assert_eq!(
            meter.consumed(),
            GasConsumed {
                cpu: 30,
                ram: 20,
                storage: 10
            }
        );
        assert_eq!(meter.penalty(100), 40);
    }

    #[test]
    fn test_out_of_gas_leaves_meter_untouched() {
        let mut meter = GasMeter::new(10);
        assert_eq!(
            meter.charge_cpu(11),
            Err(GasError::OutOfGas {
                needed: 11,
                remaining: 10
            })
        );
        assert_eq!(meter.remaining(), 10);
        assert_eq!(meter.total_consumed(), 0);
    }

    #[test]
    fn test_unmetered_charges_are_free() {
        let mut meter = GasMeter::unmetered();
        meter.charge_cpu(u64::MAX).unwrap();
        meter
            .with_budget(5, |m| m.charge_ram(1_000).map_err(GasError::from))
            .unwrap();
        assert!(meter.is_unmetered());
        assert_eq!(meter.total_consumed(), 0);
    }

    #[test]
    fn test_sub_budget_returns_leftover() {
        let mut meter = GasMeter::new(1_000);
        let result: Result<(), GasError> = meter.with_budget(100, |m| {
            m.charge_cpu(30)?;
            assert_eq!(m.remaining(), 70);
            assert_eq!(m.unused(), 970);
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(meter.remaining(), 970);
        assert_eq!(meter.depth(), 0);
    }

    #[test]
    fn test_sub_budget_restored_on_failure() {
        let mut meter = GasMeter::new(1_000);
        let result: Result<(), GasError> = meter.with_budget(100, |m| {
            m.charge_cpu(60)?;
            m.charge_cpu(60)
        });

        assert!(matches!(result, Err(GasError::OutOfGas { needed: 60, .. })));
        assert_eq!(meter.remaining(), 940);
        assert_eq!(meter.depth(), 0);
    }

    #[test]
    fn test_sub_budget_larger_than_budget() {
        let mut meter = GasMeter::new(50);
        let result: Result<(), GasError> = meter.with_budget(51, |_| Ok(()));
        assert!(result.is_err());
        assert_eq!(meter.remaining(), 50);
        assert_eq!(meter.depth(), 0);
    }

    proptest! {
        #[test]
        fn prop_budget_stack_balance(
            limit in 0u64..10_000,
            amount in 0u64..5_000,
            charges in proptest::collection::vec(0u64..500, 0..10),
        ) {
            let mut meter = GasMeter::new(limit);
            let before = meter.remaining();
            let mut leftover = None;

            let _ = meter.with_budget(amount, |m| -> Result<(), GasError> {
                for c in &charges {
                    let outcome = m.charge_cpu(*c);
                    leftover = Some(m.remaining());
                    outcome?;
                }
                leftover = Some(m.remaining());
                Ok(())
            });

            match leftover {
                Some(left) => prop_assert_eq!(meter.remaining(), before - amount as i128 + left),
                None => prop_assert_eq!(meter.remaining(), before),
            }
            prop_assert_eq!(meter.depth(), 0);
        }

        #[test]
        fn prop_consumption_is_monotone_and_bounded(
            limit in 0u64..10_000,
            charges in proptest::collection::vec((0u8..3, 0u64..800), 0..30),
        ) {
            let mut meter = GasMeter::new(limit);
            let mut last = 0;
            for (category, amount) in charges {
                let _ = match category {
                    0 => meter.charge_cpu(amount),
                    1 => meter.charge_ram(amount),
                    _ => meter.charge_storage(amount),
                };
                let total = meter.total_consumed();
                prop_assert!(total >= last);
                prop_assert!(total <= limit);
                last = total;
            }
        }
    }
}
