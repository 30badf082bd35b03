// Encodage des réponses de transaction
use super::{CodecError, Marshal, Marshaller, Unmarshal, Unmarshaller};
use crate::types::{
    ExceptionInfo, FailureCause, GasConsumed, StorageReference, StorageValue,
    TransactionReference, TransactionResponse, Update,
};

const JAR_STORE_INITIAL: u8 = 0;
const GAMETE_CREATION: u8 = 1;
const JAR_STORE_SUCCESSFUL: u8 = 2;
const JAR_STORE_FAILED: u8 = 3;
const CONSTRUCTOR_CALL_SUCCESSFUL: u8 = 4;
const CONSTRUCTOR_CALL_EXCEPTION: u8 = 5;
const CONSTRUCTOR_CALL_FAILED: u8 = 6;
const METHOD_CALL_SUCCESSFUL: u8 = 7;
const VOID_METHOD_CALL_SUCCESSFUL: u8 = 8;
const METHOD_CALL_EXCEPTION: u8 = 9;
const METHOD_CALL_FAILED: u8 = 10;

impl Marshal for GasConsumed {
    fn marshal(&self, out: &mut Marshaller) {
        out.write_compact_u64(self.cpu);
        out.write_compact_u64(self.ram);
        out.write_compact_u64(self.storage);
    }
}

impl Unmarshal for GasConsumed {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        Ok(GasConsumed {
            cpu: input.read_compact_u64()?,
            ram: input.read_compact_u64()?,
            storage: input.read_compact_u64()?,
        })
    }
}

impl Marshal for FailureCause {
    fn marshal(&self, out: &mut Marshaller) {
        out.write_utf(&self.class_name);
        out.write_utf(&self.message);
    }
}

impl Unmarshal for FailureCause {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        Ok(FailureCause {
            class_name: input.read_utf()?,
            message: input.read_utf()?,
        })
    }
}

impl Marshal for ExceptionInfo {
    fn marshal(&self, out: &mut Marshaller) {
        out.write_utf(&self.class_name);
        out.write_utf(&self.message);
        out.write_utf(&self.call_site);
    }
}

impl Unmarshal for ExceptionInfo {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        Ok(ExceptionInfo {
            class_name: input.read_utf()?,
            message: input.read_utf()?,
            call_site: input.read_utf()?,
        })
    }
}

impl Marshal for TransactionResponse {
    fn marshal(&self, out: &mut Marshaller) {
        match self {
            TransactionResponse::JarStoreInitial {
                verified_jar,
                dependencies,
                verification_version,
            } => {
                out.write_u8(JAR_STORE_INITIAL);
                out.write_bytes(verified_jar);
                out.write_all(dependencies);
                out.write_u8(*verification_version);
            }
            TransactionResponse::GameteCreation { updates, gamete } => {
                out.write_u8(GAMETE_CREATION);
                out.write_all(updates);
                gamete.marshal(out);
            }
            TransactionResponse::JarStoreSuccessful {
                verified_jar,
                dependencies,
                verification_version,
                updates,
                gas,
            } => {
                out.write_u8(JAR_STORE_SUCCESSFUL);
                out.write_bytes(verified_jar);
                out.write_all(dependencies);
                out.write_u8(*verification_version);
                out.write_all(updates);
                gas.marshal(out);
            }
            TransactionResponse::JarStoreFailed {
                cause,
                updates,
                gas,
                penalty,
            } => {
                out.write_u8(JAR_STORE_FAILED);
                write_failure(out, cause, updates, gas, *penalty);
            }
            TransactionResponse::ConstructorCallSuccessful {
                new_object,
                updates,
                events,
                gas,
            } => {
                out.write_u8(CONSTRUCTOR_CALL_SUCCESSFUL);
                new_object.marshal(out);
                write_effects(out, updates, events, gas);
            }
            TransactionResponse::ConstructorCallException {
                exception,
                updates,
                events,
                gas,
            } => {
                out.write_u8(CONSTRUCTOR_CALL_EXCEPTION);
                exception.marshal(out);
                write_effects(out, updates, events, gas);
            }
            TransactionResponse::ConstructorCallFailed {
                cause,
                updates,
                gas,
                penalty,
            } => {
                out.write_u8(CONSTRUCTOR_CALL_FAILED);
                write_failure(out, cause, updates, gas, *penalty);
            }
            TransactionResponse::MethodCallSuccessful {
                result,
                updates,
                events,
                gas,
            } => {
                out.write_u8(METHOD_CALL_SUCCESSFUL);
                result.marshal(out);
                write_effects(out, updates, events, gas);
            }
            TransactionResponse::VoidMethodCallSuccessful {
                updates,
                events,
                gas,
            } => {
                out.write_u8(VOID_METHOD_CALL_SUCCESSFUL);
                write_effects(out, updates, events, gas);
            }
            TransactionResponse::MethodCallException {
                exception,
                updates,
                events,
                gas,
            } => {
                out.write_u8(METHOD_CALL_EXCEPTION);
                exception.marshal(out);
                write_effects(out, updates, events, gas);
            }
            TransactionResponse::MethodCallFailed {
                cause,
                updates,
                gas,
                penalty,
            } => {
                out.write_u8(METHOD_CALL_FAILED);
                write_failure(out, cause, updates, gas, *penalty);
            }
        }
    }
}

fn write_effects(
    out: &mut Marshaller,
    updates: &[Update],
    events: &[StorageReference],
    gas: &GasConsumed,
) {
    out.write_all(updates);
    out.write_all(events);
    gas.marshal(out);
}

fn write_failure(
    out: &mut Marshaller,
    cause: &FailureCause,
    updates: &[Update],
    gas: &GasConsumed,
    penalty: u64,
) {
    cause.marshal(out);
    out.write_all(updates);
    gas.marshal(out);
    out.write_compact_u64(penalty);
}

type Effects = (Vec<Update>, Vec<StorageReference>, GasConsumed);

fn read_effects(input: &mut Unmarshaller<'_>) -> Result<Effects, CodecError> {
    let updates = input.read_all()?;
    let events = input.read_all()?;
    let gas = GasConsumed::unmarshal(input)?;
    Ok((updates, events, gas))
}

type Failure = (FailureCause, Vec<Update>, GasConsumed, u64);

fn read_failure(input: &mut Unmarshaller<'_>) -> Result<Failure, CodecError> {
    let cause = FailureCause::unmarshal(input)?;
    let updates = input.read_all()?;
    let gas = GasConsumed::unmarshal(input)?;
    let penalty = input.read_compact_u64()?;
    Ok((cause, updates, gas, penalty))
}

impl Unmarshal for TransactionResponse {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError> {
        let response = match input.read_u8()? {
            JAR_STORE_INITIAL => TransactionResponse::JarStoreInitial {
                verified_jar: input.read_bytes()?,
                dependencies: input.read_all::<TransactionReference>()?,
                verification_version: input.read_u8()?,
            },
            GAMETE_CREATION => TransactionResponse::GameteCreation {
                updates: input.read_all()?,
                gamete: StorageReference::unmarshal(input)?,
            },
            JAR_STORE_SUCCESSFUL => TransactionResponse::JarStoreSuccessful {
                verified_jar: input.read_bytes()?,
                dependencies: input.read_all()?,
                verification_version: input.read_u8()?,
                updates: input.read_all()?,
                gas: GasConsumed::unmarshal(input)?,
            },
            JAR_STORE_FAILED => {
                let (cause, updates, gas, penalty) = read_failure(input)?;
                TransactionResponse::JarStoreFailed {
                    cause,
                    updates,
                    gas,
                    penalty,
                }
            }
            CONSTRUCTOR_CALL_SUCCESSFUL => {
                let new_object = StorageReference::unmarshal(input)?;
                let (updates, events, gas) = read_effects(input)?;
                TransactionResponse::ConstructorCallSuccessful {
                    new_object,
                    updates,
                    events,
                    gas,
                }
            }
            CONSTRUCTOR_CALL_EXCEPTION => {
                let exception = ExceptionInfo::unmarshal(input)?;
                let (updates, events, gas) = read_effects(input)?;
                TransactionResponse::ConstructorCallException {
                    exception,
                    updates,
                    events,
                    gas,
                }
            }
            CONSTRUCTOR_CALL_FAILED => {
                let (cause, updates, gas, penalty) = read_failure(input)?;
                TransactionResponse::ConstructorCallFailed {
                    cause,
                    updates,
                    gas,
                    penalty,
                }
            }
            METHOD_CALL_SUCCESSFUL => {
                let result = StorageValue::unmarshal(input)?;
                let (updates, events, gas) = read_effects(input)?;
                TransactionResponse::MethodCallSuccessful {
                    result,
                    updates,
                    events,
                    gas,
                }
            }
            VOID_METHOD_CALL_SUCCESSFUL => {
                let (updates, events, gas) = read_effects(input)?;
                TransactionResponse::VoidMethodCallSuccessful {
                    updates,
                    events,
                    gas,
                }
            }
            METHOD_CALL_EXCEPTION => {
                let exception = ExceptionInfo::unmarshal(input)?;
                let (updates, events, gas) = read_effects(input)?;
                TransactionResponse::MethodCallException {
                    exception,
                    updates,
                    events,
                    gas,
                }
            }
            METHOD_CALL_FAILED => {
                let (cause, updates, gas, penalty) = read_failure(input)?;
                TransactionResponse::MethodCallFailed {
                    cause,
                    updates,
                    gas,
                    penalty,
                }
            }
            selector => {
                return Err(CodecError::UnknownSelector {
                    what: "response",
                    selector,
                })
            }
        };

        Ok(response)
    }
}
