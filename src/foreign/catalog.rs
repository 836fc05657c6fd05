use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use super::{CallDescriptor, CallType};

pub const GENERIC_ARRAY_COPY: &str = "arraycopy_generic";
pub const UNWIND_EXCEPTION: &str = "unwind_exception";
pub const NEW_INSTANCE: &str = "new_instance";
pub const NEW_ARRAY: &str = "new_array";
pub const IDENTITY_HASH_CODE: &str = "identity_hash_code";
pub const LOG_PRIMITIVE: &str = "log_primitive";

/// The well-known runtime calls. Shared read-only by all compilations.
#[derive(Debug)]
pub struct RuntimeCallCatalog {
    descriptors: HashMap<String, Arc<CallDescriptor>>,
    generic_array_copy: Arc<CallDescriptor>,
}

static CATALOG: LazyLock<RuntimeCallCatalog> = LazyLock::new(RuntimeCallCatalog::new);

pub fn runtime_calls() -> &'static RuntimeCallCatalog {
    &CATALOG
}

fn builtin(name: &'static str, result: CallType, arguments: &[CallType]) -> Arc<CallDescriptor> {
    debug_assert!(!name.is_empty() && !name.contains(char::is_whitespace));
    Arc::new(CallDescriptor {
        name: name.to_string(),
        result_type: result,
        argument_types: arguments.to_vec(),
    })
}

impl RuntimeCallCatalog {
    fn new() -> Self {
        use CallType::*;

        let generic_array_copy = builtin(GENERIC_ARRAY_COPY, Int, &[Object, Int, Object, Int, Int]);
        let descriptors = [
            generic_array_copy.clone(),
            builtin(UNWIND_EXCEPTION, Void, &[Object]),
            builtin(NEW_INSTANCE, Object, &[Word]),
            builtin(NEW_ARRAY, Object, &[Word, Int]),
            builtin(IDENTITY_HASH_CODE, Int, &[Object]),
            builtin(LOG_PRIMITIVE, Void, &[Int, Long, Boolean]),
        ];
        let descriptors = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name().to_string(), descriptor))
            .collect();
        Self {
            descriptors,
            generic_array_copy,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CallDescriptor>> {
        self.descriptors.get(name)
    }

    /// The stub used for copies whose element kind is not known statically.
    pub fn generic_array_copy(&self) -> &Arc<CallDescriptor> {
        &self.generic_array_copy
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.descriptors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_shared() {
        let first = runtime_calls().generic_array_copy();
        let second = runtime_calls().get(GENERIC_ARRAY_COPY).unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(first.to_string(), "arraycopy_generic(Object,int,Object,int,int)int");
    }

    #[test]
    fn every_builtin_name_is_valid() {
        for name in runtime_calls().names() {
            let descriptor = runtime_calls().get(name).unwrap();
            assert!(CallDescriptor::new(name, descriptor.result_type(), descriptor.argument_types()).is_ok());
        }
        assert_eq!(runtime_calls().names().count(), 6);
    }
}
