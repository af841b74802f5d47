//! Utilities for the deploy scripts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
};
use alloy_primitives::{Address, Bytes, B256};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    constants::{NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT, TMP_FILE_SUFFIX},
    errors::ScriptError,
    types::InitCall,
};

/// Reads and parses a JSON file, returning `None` if the file does not exist.
///
/// The error constructor lets callers classify failures by the kind of
/// document being read.
pub fn read_json_file<T: DeserializeOwned>(
    path: &Path,
    err: fn(String) -> ScriptError,
) -> Result<Option<T>, ScriptError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| err(format!("{}: {}", path.display(), e)))
}

/// Serializes `value` and writes it to `path` such that a crash mid-write
/// never leaves a truncated document behind.
///
/// The document is written to a sibling scratch file, which is then renamed
/// over the destination.
pub fn write_json_file<T: Serialize>(
    path: &Path,
    value: &T,
    err: fn(String) -> ScriptError,
) -> Result<(), ScriptError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
    }

    let contents = serde_json::to_string_pretty(value).map_err(|e| err(e.to_string()))?;
    write_atomically(path, contents.as_bytes()).map_err(|e| err(e.to_string()))
}

/// Writes `contents` to a scratch file beside `path` and renames it into place
pub fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = scratch_path(path);
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

/// The scratch file used when atomically replacing `path`
fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TMP_FILE_SUFFIX);
    path.with_file_name(name)
}

/// Extracts the address held in the low-order bytes of a storage word
pub fn address_from_slot(word: B256) -> Address {
    Address::from_slice(&word[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT])
}

/// Encodes an initializer call against the implementation's ABI.
///
/// Each argument string is coerced to the corresponding input type, so
/// `"0xC02a..."` becomes an `address` and `"vaETH"` a `string`.
pub fn encode_init_call(abi: &JsonAbi, init: &InitCall) -> Result<Bytes, ScriptError> {
    let candidates = abi.function(&init.method).ok_or_else(|| {
        ScriptError::CalldataConstruction(format!("ABI has no method `{}`", init.method))
    })?;
    let function = candidates
        .iter()
        .find(|f| f.inputs.len() == init.args.len())
        .ok_or_else(|| {
            ScriptError::CalldataConstruction(format!(
                "no overload of `{}` takes {} arguments",
                init.method,
                init.args.len()
            ))
        })?;

    let values = coerce_args(&function.inputs, &init.args)?;
    function
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

/// Encodes constructor arguments against a contract's ABI.
///
/// A contract without a constructor takes no arguments.
pub fn encode_constructor_args(abi: &JsonAbi, args: &[String]) -> Result<Bytes, ScriptError> {
    let Some(constructor) = abi.constructor() else {
        return if args.is_empty() {
            Ok(Bytes::new())
        } else {
            Err(ScriptError::CalldataConstruction(
                "contract has no constructor but arguments were given".to_string(),
            ))
        };
    };

    if constructor.inputs.len() != args.len() {
        return Err(ScriptError::CalldataConstruction(format!(
            "constructor takes {} arguments, {} given",
            constructor.inputs.len(),
            args.len()
        )));
    }

    let values = coerce_args(&constructor.inputs, args)?;
    constructor
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

/// Coerces each argument string to the type of the matching parameter
fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, ScriptError> {
    params
        .iter()
        .zip(args.iter())
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
            ty.coerce_str(arg)
                .map_err(|e| ScriptError::CalldataConstruction(format!("`{arg}`: {e}")))
        })
        .collect()
}
