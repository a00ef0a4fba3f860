//! Bitmask encoding and checking of named permissions.
//!
//! A permission list is an ordered sequence of names; the name at index `i`
//! owns bit `i` of a value (least-significant first). The codec turns a
//! selection of names into a mask and back, and the gate answers whether a
//! single name is granted by a value.
//!
//! # Example
//!
//! ```
//! use turnstile::permission::{self, Mode, PermissionValue};
//!
//! let list = ["view", "modifyOwn", "modifyAll", "delete", "action"];
//! let mask = permission::encode(&list, &["view", "modifyOwn"], Mode::Require).unwrap();
//! assert_eq!(mask, 0b11);
//!
//! let value = PermissionValue::Bitmask(mask);
//! assert!(permission::check(value, &list, "modifyOwn").unwrap());
//! assert!(!permission::check(value, &list, "delete").unwrap());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest number of permissions a single list may hold.
///
/// Stored values are signed 64-bit integers with `-1` reserved, so the
/// highest usable bit is 62.
pub const MAX_PERMISSIONS: usize = 63;

/// How a selection of names is turned into bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Set exactly the selected permissions.
    #[default]
    Require,
    /// Set every permission except the selected ones.
    Except,
}

/// A permission value as held for one actor and one model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionValue {
    /// Every permission of the model, whatever its list holds.
    AllGranted,
    /// Bit `i` set grants the permission at index `i`.
    Bitmask(u64),
}

impl PermissionValue {
    /// No permissions at all.
    pub const NONE: PermissionValue = PermissionValue::Bitmask(0);

    /// Integer sentinel used for [`PermissionValue::AllGranted`] in storage.
    pub const ALL_GRANTED_STORED: i64 = -1;

    /// Interpret an integer read from the durable store.
    pub fn from_stored(raw: i64) -> Result<Self> {
        match raw {
            Self::ALL_GRANTED_STORED => Ok(PermissionValue::AllGranted),
            raw if raw >= 0 => Ok(PermissionValue::Bitmask(raw as u64)),
            raw => Err(Error::Validation(format!(
                "stored permission value {raw} is negative"
            ))),
        }
    }

    /// Integer written to the durable store.
    pub fn to_stored(self) -> i64 {
        match self {
            PermissionValue::AllGranted => Self::ALL_GRANTED_STORED,
            // Masks never exceed MAX_PERMISSIONS bits, so bit 63 stays clear.
            PermissionValue::Bitmask(bits) => (bits & i64::MAX as u64) as i64,
        }
    }

    /// Concrete bits for a list of `len` permissions.
    pub fn bits(self, len: usize) -> u64 {
        match self {
            PermissionValue::AllGranted => full_mask(len),
            PermissionValue::Bitmask(bits) => bits,
        }
    }
}

impl From<u64> for PermissionValue {
    fn from(bits: u64) -> Self {
        PermissionValue::Bitmask(bits)
    }
}

/// Mask with the lowest `len` bits set.
pub fn full_mask(len: usize) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// Position of `name` in `list`, if present.
pub fn index_of<L: AsRef<str>>(list: &[L], name: &str) -> Option<usize> {
    list.iter().position(|p| p.as_ref() == name)
}

/// Pack a selection of names into a mask.
///
/// In [`Mode::Require`] bit `i` is set iff `list[i]` is selected, in
/// [`Mode::Except`] iff it is not. Selecting a name missing from `list`
/// is a validation failure.
pub fn encode<L, S>(list: &[L], selected: &[S], mode: Mode) -> Result<u64>
where
    L: AsRef<str>,
    S: AsRef<str>,
{
    if list.len() > MAX_PERMISSIONS {
        return Err(Error::Validation(format!(
            "permission list holds {} names, at most {MAX_PERMISSIONS} fit",
            list.len()
        )));
    }
    if let Some(unknown) = selected
        .iter()
        .find(|s| index_of(list, s.as_ref()).is_none())
    {
        return Err(Error::Validation(format!(
            "unknown permission `{}`",
            unknown.as_ref()
        )));
    }

    let require = mode == Mode::Require;
    let mask = list.iter().enumerate().fold(0u64, |mask, (i, name)| {
        let is_selected = selected.iter().any(|s| s.as_ref() == name.as_ref());
        mask | (((is_selected == require) as u64) << i)
    });
    Ok(mask)
}

/// Names granted by `value`, in list order.
///
/// Bits beyond the end of `list` are ignored.
pub fn decode<L: AsRef<str>>(list: &[L], value: PermissionValue) -> Vec<&str> {
    let mut bits = match value {
        PermissionValue::AllGranted => return list.iter().map(AsRef::as_ref).collect(),
        PermissionValue::Bitmask(bits) => bits,
    };

    let mut names = Vec::new();
    let mut index = 0;
    while bits > 0 {
        if bits & 1 == 1
            && let Some(name) = list.get(index)
        {
            names.push(name.as_ref());
        }
        index += 1;
        bits >>= 1;
    }
    names
}

/// Whether `value` grants `name`.
///
/// A name absent from `list` is `NotFound` rather than a silent `false`.
pub fn check<L: AsRef<str>>(value: PermissionValue, list: &[L], name: &str) -> Result<bool> {
    let index = index_of(list, name)
        .ok_or_else(|| Error::NotFound(format!("permission `{name}`")))?;
    Ok(match value {
        PermissionValue::AllGranted => true,
        PermissionValue::Bitmask(bits) => (bits >> index) & 1 == 1,
    })
}

/// OR the encoded selection into `value`.
pub fn add_permission<L, S>(
    value: PermissionValue,
    list: &[L],
    selected: &[S],
    mode: Mode,
) -> Result<PermissionValue>
where
    L: AsRef<str>,
    S: AsRef<str>,
{
    let mask = encode(list, selected, mode)?;
    Ok(match value {
        PermissionValue::AllGranted => PermissionValue::AllGranted,
        PermissionValue::Bitmask(bits) => PermissionValue::Bitmask(bits | mask),
    })
}

/// Clear the encoded selection from `value`.
///
/// Removing from [`PermissionValue::AllGranted`] first expands it to the
/// full mask of `list`.
pub fn remove_permission<L, S>(
    value: PermissionValue,
    list: &[L],
    selected: &[S],
    mode: Mode,
) -> Result<PermissionValue>
where
    L: AsRef<str>,
    S: AsRef<str>,
{
    let mask = encode(list, selected, mode)?;
    if mask == 0 {
        return Ok(value);
    }
    Ok(PermissionValue::Bitmask(value.bits(list.len()) & !mask))
}
