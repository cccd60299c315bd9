//! Callback signatures and binding lifetimes.
//!
//! A signature names one result letter followed by zero or more argument
//! letters. Two spellings are accepted:
//!
//! - compact: `"ipp"` (result `i`, arguments `p`, `p`)
//! - parenthesised: `"i(pp)"`, with `"v()"` for a nullary void function
//!
//! Letters: `i` = i32, `p`/`P`/`s` = pointer, `j` = i64, `f` = f32,
//! `d` = f64, and `v` = void (result position only).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One signature letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigType {
    I32,
    /// Pointer-sized integer (i32 or i64 depending on the pointer IR).
    Ptr,
    I64,
    F32,
    F64,
    /// No value; result position only.
    Void,
}

impl SigType {
    fn from_letter(c: char) -> Result<Self, Error> {
        match c {
            'i' => Ok(Self::I32),
            'p' | 'P' | 's' => Ok(Self::Ptr),
            'j' => Ok(Self::I64),
            'f' => Ok(Self::F32),
            'd' => Ok(Self::F64),
            other => Err(Error::invalid_type(format!(
                "invalid signature letter: {other}"
            ))),
        }
    }

    const fn letter(self) -> char {
        match self {
            Self::I32 => 'i',
            Self::Ptr => 'p',
            Self::I64 => 'j',
            Self::F32 => 'f',
            Self::F64 => 'd',
            Self::Void => 'v',
        }
    }
}

/// A parsed callback signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    result: SigType,
    params: Vec<SigType>,
}

impl Signature {
    pub fn new(result: SigType, params: Vec<SigType>) -> Result<Self, Error> {
        if params.contains(&SigType::Void) {
            return Err(Error::invalid_type("void is only legal as a result type"));
        }
        Ok(Self { result, params })
    }

    pub fn result(&self) -> SigType {
        self.result
    }

    pub fn params(&self) -> &[SigType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(sig: &str) -> Result<Self, Error> {
        let mut chars = sig.chars();
        let result = match chars.next() {
            Some('v') => SigType::Void,
            Some(c) => SigType::from_letter(c)?,
            None => return Err(Error::invalid_type("empty function signature")),
        };
        let rest = chars.as_str();
        let params = match rest.strip_prefix('(') {
            Some(inner) => inner.strip_suffix(')').ok_or_else(|| {
                Error::invalid_type(format!("unbalanced function signature: {sig}"))
            })?,
            None => rest,
        };
        let params = params
            .chars()
            .map(SigType::from_letter)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { result, params })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.result.letter())?;
        for p in &self.params {
            write!(f, "{}", p.letter())?;
        }
        f.write_str(")")
    }
}

/// How long a callback-pointer binding stays installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindScope {
    /// Installed for one wrapped call, uninstalled when its scope closes.
    Transient,
    /// One binding per context key.
    Context,
    /// One binding per adapter instance.
    Singleton,
    /// Installed once, never reclaimed.
    Permanent,
}

impl FromStr for BindScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "transient" => Ok(Self::Transient),
            "context" => Ok(Self::Context),
            "singleton" => Ok(Self::Singleton),
            "permanent" => Ok(Self::Permanent),
            other => Err(Error::invalid_type(format!(
                "invalid bind scope ({other}), expecting one of: transient, context, singleton, permanent"
            ))),
        }
    }
}
