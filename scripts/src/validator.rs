//! Storage-layout compatibility checks run before every upgrade

use itertools::Itertools;
use tracing::debug;

use crate::{
    artifacts::ContractArtifact,
    errors::ScriptError,
    types::{DeploymentRecord, StorageLayout, StorageVariable},
};

/// Decides whether a new implementation may replace a deployed one
pub trait UpgradeValidator {
    /// Fail with [`ScriptError::StorageIncompatible`] if `new` cannot safely
    /// replace the implementation recorded in `old`
    fn validate(
        &self,
        old: &DeploymentRecord,
        contract_type: &str,
        new: &ContractArtifact,
    ) -> Result<(), ScriptError>;
}

/// Compares the compiler-emitted storage layouts of the two implementations.
///
/// Every variable of the old layout must keep its position, name and type in
/// the new layout. New variables may only be appended.
#[derive(Clone, Copy, Debug, Default)]
pub struct StorageLayoutValidator;

impl UpgradeValidator for StorageLayoutValidator {
    fn validate(
        &self,
        old: &DeploymentRecord,
        contract_type: &str,
        new: &ContractArtifact,
    ) -> Result<(), ScriptError> {
        if old.bytecode_hash() == new.bytecode_hash() {
            debug!("`{contract_type}` bytecode is unchanged, layout is trivially compatible");
            return Ok(());
        }

        let old_layout = old.storage_layout.as_ref().ok_or_else(|| {
            ScriptError::StorageIncompatible(format!(
                "no storage layout recorded for the deployed `{contract_type}` at {:#x}",
                old.address
            ))
        })?;
        let new_layout = new.storage_layout.as_ref().ok_or_else(|| {
            ScriptError::StorageIncompatible(format!(
                "the `{contract_type}` artifact carries no storage layout"
            ))
        })?;

        let problems = compare_variables(
            &old_layout.storage,
            old_layout,
            &new_layout.storage,
            new_layout,
            "",
        );
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ScriptError::StorageIncompatible(format!(
                "`{contract_type}`: {}",
                problems.join("; ")
            )))
        }
    }
}

/// Compare two variable lists position by position, returning every problem found
fn compare_variables(
    old_vars: &[StorageVariable],
    old_layout: &StorageLayout,
    new_vars: &[StorageVariable],
    new_layout: &StorageLayout,
    scope: &str,
) -> Vec<String> {
    old_vars
        .iter()
        .enumerate()
        .flat_map(|(i, old_var)| {
            let name = format!("{scope}{}", old_var.label);
            let Some(new_var) = new_vars.get(i) else {
                return vec![format!("`{name}` was deleted")];
            };

            let mut problems = Vec::new();
            if old_var.label != new_var.label {
                problems.push(format!("`{name}` was renamed to `{}`", new_var.label));
            }
            if old_var.slot != new_var.slot || old_var.offset != new_var.offset {
                problems.push(format!(
                    "`{name}` moved from slot {}+{} to slot {}+{}",
                    old_var.slot, old_var.offset, new_var.slot, new_var.offset
                ));
            }
            problems.extend(compare_types(
                &old_var.type_id,
                old_layout,
                &new_var.type_id,
                new_layout,
                &name,
            ));
            problems
        })
        .collect_vec()
}

/// Compare two types by their canonical labels, sizes and struct members.
///
/// Type identifiers embed AST ids that change between compilations, so
/// they are only used as lookup keys.
fn compare_types(
    old_id: &str,
    old_layout: &StorageLayout,
    new_id: &str,
    new_layout: &StorageLayout,
    name: &str,
) -> Vec<String> {
    let (Some(old_ty), Some(new_ty)) = (old_layout.types.get(old_id), new_layout.types.get(new_id))
    else {
        // Without type information only the identifiers can be compared
        return if old_id == new_id {
            vec![]
        } else {
            vec![format!("`{name}` changed type from {old_id} to {new_id}")]
        };
    };

    if old_ty.label != new_ty.label || old_ty.number_of_bytes != new_ty.number_of_bytes {
        return vec![format!(
            "`{name}` changed type from {} to {}",
            old_ty.label, new_ty.label
        )];
    }

    compare_variables(
        &old_ty.members,
        old_layout,
        &new_ty.members,
        new_layout,
        &format!("{name}."),
    )
}
