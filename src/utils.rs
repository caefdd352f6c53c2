//! # Utility Functions Module
//!
//! Helpers for building argument vectors for the external tools.

use std::ffi::OsString;

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// # Example
/// ```rust
/// use vidsqueeze::utils::to_string_vec;
///
/// let args = to_string_vec(["-v", "quiet", "-print_format", "json"]);
/// assert_eq!(args.len(), 4);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Converts string arguments into `OsString`s so they can sit next to paths
pub fn to_os_args<I>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = String>,
{
    items.into_iter().map(OsString::from).collect()
}

/// Build a `Vec<String>` from heterogeneous displayable values.
///
/// # Example
/// ```rust
/// use vidsqueeze::args;
///
/// let crf = 23;
/// let args = args!["-crf", crf, "-preset", "medium"];
/// assert_eq!(args, vec!["-crf", "23", "-preset", "medium"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}
