//! Navigation snippet injection
//!
//! Splices one inline script block before the last closing body tag of
//! every HTML file in the generated output. The transformation is
//! purely syntactic; files without a closing body tag are left alone.
//! The script reads `/<repo-id>/refs.json` at view time and decorates
//! the page with links to the repository's other published targets;
//! failure to reach the endpoint is silent.

use std::path::Path;

use docharbor_core::RefKind;
use tracing::debug;
use walkdir::WalkDir;

/// Values baked into the injected script
#[derive(Debug, Clone)]
pub struct NavContext<'a> {
    pub repository_id: i64,
    pub target_slug: &'a str,
    pub ref_kind: RefKind,
    pub ref_name: &'a str,
    pub version: &'a str,
}

const MARKER: &str = "DOCHARBOR_REPO";

/// Walk `out_dir` and inject the snippet into every HTML file that has
/// a closing body tag. Returns how many files were modified.
pub fn inject_navigation(out_dir: &Path, ctx: &NavContext<'_>) -> std::io::Result<usize> {
    let snippet = snippet(ctx);
    let mut injected = 0;

    for entry in WalkDir::new(out_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !has_html_extension(path) {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(path) else {
            // non-UTF-8 files are left untouched
            continue;
        };
        if contents.contains(MARKER) {
            continue;
        }
        if let Some(updated) = splice_before_body_end(&contents, &snippet) {
            std::fs::write(path, updated)?;
            injected += 1;
        }
    }

    debug!(out = %out_dir.display(), injected, "navigation snippet injected");
    Ok(injected)
}

fn has_html_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html"))
        .unwrap_or(false)
}

/// Insert `snippet` immediately before the last `</body>` (any case).
/// `None` when the document has no closing body tag.
pub(crate) fn splice_before_body_end(contents: &str, snippet: &str) -> Option<String> {
    let lower = contents.to_lowercase();
    let idx = lower.rfind("</body>")?;
    let mut updated = String::with_capacity(contents.len() + snippet.len());
    updated.push_str(&contents[..idx]);
    updated.push_str(snippet);
    updated.push_str(&contents[idx..]);
    Some(updated)
}

fn snippet(ctx: &NavContext<'_>) -> String {
    // serde_json handles escaping of ref names and versions
    let slug = serde_json::to_string(ctx.target_slug).unwrap_or_else(|_| "\"\"".into());
    let ref_name = serde_json::to_string(ctx.ref_name).unwrap_or_else(|_| "\"\"".into());
    let ref_kind = serde_json::to_string(&ctx.ref_kind.to_string()).unwrap_or_else(|_| "\"\"".into());
    let version = serde_json::to_string(ctx.version).unwrap_or_else(|_| "\"\"".into());

    format!(
        r#"<script>
(function () {{
  window.DOCHARBOR_REPO = {repo};
  window.DOCHARBOR_TARGET = {slug};
  window.DOCHARBOR_REF_TYPE = {ref_kind};
  window.DOCHARBOR_REF_NAME = {ref_name};
  window.DOCHARBOR_VERSION = {version};
  fetch("/" + window.DOCHARBOR_REPO + "/refs.json")
    .then(function (resp) {{ return resp.json(); }})
    .then(function (index) {{
      var host = document.querySelector(".sphinxsidebar") || document.body;
      var box = document.createElement("div");
      box.className = "docharbor-refs";
      var label = document.createElement("strong");
      label.textContent = "Versions (" + window.DOCHARBOR_VERSION + ")";
      box.appendChild(label);
      index.targets.forEach(function (t) {{
        if (!t.has_artifact) {{ return; }}
        var link = document.createElement("a");
        link.href = t.url;
        link.textContent =
          t.slug === window.DOCHARBOR_TARGET ? t.ref_name + " (current)" : t.ref_name;
        box.appendChild(document.createElement("br"));
        box.appendChild(link);
      }});
      host.insertBefore(box, host.firstChild);
    }})
    .catch(function () {{}});
}})();
</script>
"#,
        repo = ctx.repository_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> NavContext<'static> {
        NavContext {
            repository_id: 3,
            target_slug: "main",
            ref_kind: RefKind::Branch,
            ref_name: "main",
            version: "1.2.3",
        }
    }

    #[test]
    fn splices_before_the_last_body_tag() {
        let html = "<html><body><p>x</p></body></html>";
        let out = splice_before_body_end(html, "<script>s</script>").unwrap();
        assert_eq!(out, "<html><body><p>x</p><script>s</script></body></html>");
    }

    #[test]
    fn body_tag_matching_is_case_insensitive() {
        let html = "<HTML><BODY>x</BODY></HTML>";
        let out = splice_before_body_end(html, "S").unwrap();
        assert!(out.contains("xS</BODY>"));
    }

    #[test]
    fn missing_body_tag_is_left_untouched() {
        assert!(splice_before_body_end("<html>no body end", "S").is_none());
    }

    #[test]
    fn walks_nested_output_and_counts() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("api")).unwrap();
        std::fs::write(tmp.path().join("index.html"), "<body>a</body>").unwrap();
        std::fs::write(tmp.path().join("api/mod.html"), "<body>b</body>").unwrap();
        std::fs::write(tmp.path().join("style.css"), "body {}").unwrap();
        std::fs::write(tmp.path().join("partial.html"), "<div>no body tag</div>").unwrap();

        let injected = inject_navigation(tmp.path(), &ctx()).unwrap();
        assert_eq!(injected, 2);

        let index = std::fs::read_to_string(tmp.path().join("index.html")).unwrap();
        assert!(index.contains("window.DOCHARBOR_REPO = 3"));
        assert!(index.contains("window.DOCHARBOR_TARGET = \"main\""));
        assert!(index.contains("refs.json"));

        // the file without a closing tag is untouched
        let partial = std::fs::read_to_string(tmp.path().join("partial.html")).unwrap();
        assert_eq!(partial, "<div>no body tag</div>");

        // non-HTML assets are untouched
        let css = std::fs::read_to_string(tmp.path().join("style.css")).unwrap();
        assert_eq!(css, "body {}");
    }

    #[test]
    fn injection_is_idempotent_per_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<body>a</body>").unwrap();
        assert_eq!(inject_navigation(tmp.path(), &ctx()).unwrap(), 1);
        assert_eq!(inject_navigation(tmp.path(), &ctx()).unwrap(), 0);
    }

    #[test]
    fn version_string_is_escaped() {
        let mut c = ctx();
        c.version = "1.0 \"beta\"";
        let s = snippet(&c);
        assert!(s.contains(r#"window.DOCHARBOR_VERSION = "1.0 \"beta\"""#));
    }
}
