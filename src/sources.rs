//! Debuggee source and symbol search paths.

use crate::error::Error;
use itertools::Itertools;
use log::warn;
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::process::Command;

static ENVIRONMENT: OnceCell<RustEnvironment> = OnceCell::new();
static ENV_VAR_RE: OnceCell<Regex> = OnceCell::new();

/// Rust toolchain of the adapter host.
#[derive(Debug)]
pub struct RustEnvironment {
    pub sysroot: Option<PathBuf>,
}

impl RustEnvironment {
    /// Environment detected at first call.
    pub fn current() -> &'static Self {
        ENVIRONMENT.get_or_init(|| {
            let sysroot = default_sysroot();
            if let Err(ref e) = sysroot {
                warn!(target: "gateway", "detect rust sysroot: {e}")
            }
            RustEnvironment {
                sysroot: sysroot.ok(),
            }
        })
    }

    /// Sources of the standard library, if toolchain has them.
    pub fn std_lib_path(&self) -> Option<PathBuf> {
        self.sysroot
            .as_ref()
            .map(|sysroot| sysroot.join("lib/rustlib/src/rust"))
    }
}

fn default_sysroot() -> Result<PathBuf, Error> {
    let rustc_out = Command::new("rustc")
        .args(["--print", "sysroot"])
        .output()?;
    let out = String::from_utf8(rustc_out.stdout)?;
    let sysroot = out.trim();
    if sysroot.is_empty() {
        return Err(Error::UnrecognizedRustcOut(out));
    }
    Ok(PathBuf::from(sysroot))
}

/// Substitute `%VAR%`, `$VAR` and `${VAR}` with environment values. Unknown variables stay as is.
pub fn expand_env(path: &str) -> String {
    let re = ENV_VAR_RE.get_or_init(|| {
        Regex::new(r"%(\w+)%|\$\{(\w+)\}|\$(\w+)").expect("valid env variable regex")
    });
    re.replace_all(path, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Engine source path: user paths with expanded variables, then std library sources.
pub fn source_path<S: AsRef<str>>(user_paths: &[S], std_lib: Option<&Path>) -> String {
    user_paths
        .iter()
        .map(|p| expand_env(p.as_ref()))
        .chain(std_lib.map(|p| p.to_string_lossy().to_string()))
        .filter(|p| !p.is_empty())
        .unique()
        .join(";")
}

/// Engine symbol path: directory of the debuggee, then user paths.
pub fn symbol_path<S: AsRef<str>>(target: Option<&Path>, user_paths: &[S]) -> String {
    target
        .and_then(Path::parent)
        .map(|dir| dir.to_string_lossy().to_string())
        .into_iter()
        .chain(user_paths.iter().map(|p| expand_env(p.as_ref())))
        .filter(|p| !p.is_empty())
        .unique()
        .join(";")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_expand_env() {
        std::env::set_var("DBGENG_DAP_TEST_ROOT", "/opt/src");
        assert_eq!(expand_env("%DBGENG_DAP_TEST_ROOT%/app"), "/opt/src/app");
        assert_eq!(expand_env("$DBGENG_DAP_TEST_ROOT/app"), "/opt/src/app");
        assert_eq!(expand_env("${DBGENG_DAP_TEST_ROOT}/app"), "/opt/src/app");
        assert_eq!(
            expand_env("%DBGENG_DAP_TEST_MISSING%/app"),
            "%DBGENG_DAP_TEST_MISSING%/app"
        );
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn test_source_path() {
        let path = source_path(&["a", "b", "a", ""], Some(Path::new("/rust/src")));
        assert_eq!(path, "a;b;/rust/src");
        assert_eq!(source_path::<&str>(&[], None), "");
    }

    #[test]
    fn test_symbol_path() {
        let path = symbol_path(Some(Path::new("/work/target/app")), &["/syms", "/work/target"]);
        assert_eq!(path, "/work/target;/syms");
        assert_eq!(symbol_path(None, &["/syms"]), "/syms");
    }
}
