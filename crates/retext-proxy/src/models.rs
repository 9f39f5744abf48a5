//! Model listing with alias entries.

use retext_config::ModelAliasTable;
use retext_providers::{ModelEntry, ModelList};

/// Append a synthetic `owned_by: "custom"` entry for every alias that the
/// upstream list does not already carry under the same id.
pub fn merge_aliases(mut list: ModelList, aliases: &ModelAliasTable, created: i64) -> ModelList {
    for custom in aliases.keys() {
        if list.data.iter().any(|model| model.id == custom) {
            continue;
        }
        list.data.push(ModelEntry::custom(custom, created));
    }
    list
}
