//! Where `convert` and `check` write their results.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// The explicit path when given, otherwise `<prefix><file name>` beside the
/// input configuration. Either way it must not be the input itself.
pub fn output_path(input: &Path, explicit: Option<&Path>, prefix: &str) -> Result<PathBuf> {
    let output = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let name = input
                .file_name()
                .with_context(|| format!("input path {} has no file name", input.display()))?;
            let mut file_name = OsString::from(prefix);
            file_name.push(name);
            input.with_file_name(file_name)
        }
    };
    refuse_clobber(&output, &[input])?;
    Ok(output)
}

/// Fails when `path` names the same file as one of `protected`.
pub fn refuse_clobber(path: &Path, protected: &[&Path]) -> Result<()> {
    let target = comparable(path)?;
    for other in protected {
        if comparable(other)? == target {
            bail!(
                "{} would overwrite the configuration at {}",
                path.display(),
                other.display()
            );
        }
    }
    Ok(())
}

// Files that do not exist yet are compared through their resolved
// directory, so `./a/../ns.conf` still matches `ns.conf`.
fn comparable(path: &Path) -> Result<PathBuf> {
    if let Ok(real) = fs::canonicalize(path) {
        return Ok(real);
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => Ok(dir.join(name)),
        _ => Ok(env::current_dir()
            .context("failed to read the current directory")?
            .join(path)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{output_path, refuse_clobber};

    #[test]
    fn default_output_sits_beside_the_input() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("ns.conf");
        let out = output_path(&input, None, "nspepi_").expect("path");
        assert_eq!(out, dir.path().join("nspepi_ns.conf"));
    }

    #[test]
    fn explicit_output_naming_the_input_is_refused() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("ns.conf");
        fs::write(&input, "").expect("write");
        let err = output_path(&input, Some(&input), "nspepi_").expect_err("same file");
        assert!(err.to_string().contains("would overwrite the configuration"));
    }

    #[test]
    fn unresolved_parent_segments_still_match() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let input = dir.path().join("ns.conf");
        fs::write(&input, "").expect("write");
        let report = dir.path().join("sub").join("..").join("ns.conf");
        assert!(refuse_clobber(&report, &[input.as_path()]).is_err());
        assert!(refuse_clobber(Path::new("elsewhere.json"), &[input.as_path()]).is_ok());
    }
}
