//! Project manifest inspection for Docharbor
//!
//! Reads `pyproject.toml` from a checkout to discover optional
//! dependency extras, project metadata, and the interpreter version
//! the pinned environment backend should select.

pub mod extras;
pub mod pyproject;

use std::path::{Path, PathBuf};

pub use extras::{select_install_extras, DOC_EXTRA_NAMES};
pub use pyproject::{Manifest, ManifestError};

/// Requirements files honored when a checkout carries no manifest,
/// in priority order.
const REQUIREMENTS_CANDIDATES: &[&str] =
    &["requirements.txt", "docs/requirements.txt", "docs/requirements-docs.txt"];

/// First requirements file present at the checkout root, if any
pub fn requirements_fallback(checkout_root: &Path) -> Option<PathBuf> {
    REQUIREMENTS_CANDIDATES
        .iter()
        .map(|name| checkout_root.join(name))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_fallback_priority() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(requirements_fallback(tmp.path()), None);

        std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
        std::fs::write(tmp.path().join("docs/requirements.txt"), "sphinx\n").unwrap();
        assert_eq!(
            requirements_fallback(tmp.path()),
            Some(tmp.path().join("docs/requirements.txt"))
        );

        std::fs::write(tmp.path().join("requirements.txt"), "sphinx\n").unwrap();
        assert_eq!(
            requirements_fallback(tmp.path()),
            Some(tmp.path().join("requirements.txt"))
        );
    }
}
