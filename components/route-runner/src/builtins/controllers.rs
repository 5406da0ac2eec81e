// Local crates
use crate::loader::{Function, Module, ModuleRegistry, Value, Variables};

// External crates
use anyhow::{Result, bail};

pub const MERGE_VARIABLES: &str = "@ves/merge-variables";

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.register(MERGE_VARIABLES, || {
        Module::new().with_default(Value::Function(Function::native(
            MERGE_VARIABLES,
            |this, args| async move { merge_variables(this, args) },
        )))
    });
}

/// Record with the bound variables merged in. Keys already on the record
/// are left alone.
fn merge_variables(this: Option<Variables>, args: Vec<Value>) -> Result<Value> {
    let mut record = match args.into_iter().next() {
        Some(Value::Map(record)) => record,
        Some(other) => bail!("{MERGE_VARIABLES}: expected an object record, got '{}'", other.type_name()),
        None => bail!("{MERGE_VARIABLES}: called without a record"),
    };

    for (key, value) in this.unwrap_or_default() {
        record.entry(key).or_insert_with(|| Value::from(value));
    }

    Ok(Value::Map(record))
}
