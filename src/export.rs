use wasm_bindgen::{JsCast, JsValue};

use crate::markdown::escape_html;
use crate::model::DEFAULT_TITLE;

const EXPORT_STYLESHEET: &str = r#"
body { max-width: 860px; margin: 2rem auto; padding: 0 1.5rem; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; line-height: 1.6; color: #1f2328; }
h1, h2 { border-bottom: 1px solid #d0d7de; padding-bottom: 0.3em; }
pre { background: #f6f8fa; padding: 1rem; border-radius: 6px; overflow-x: auto; }
code { font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; font-size: 0.9em; }
:not(pre) > code { background: #eff1f3; padding: 0.15em 0.35em; border-radius: 4px; }
blockquote { margin: 0; padding: 0 1em; color: #59636e; border-left: 0.25em solid #d0d7de; }
table { border-collapse: collapse; }
th, td { border: 1px solid #d0d7de; padding: 6px 13px; }
img { max-width: 100%; }
"#;

/// Standalone HTML page around an already rendered markdown body.
pub fn export_html(title: &str, body_html: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{EXPORT_STYLESHEET}</style>\n</head>\n\
         <body>\n<article class=\"markdown-body\">\n{body_html}</article>\n</body>\n</html>\n"
    )
}

/// Title reduced to characters safe in a download name, plus `.html`.
pub fn export_file_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut gap = false;
    for ch in title.trim().chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            if gap && !name.is_empty() {
                name.push('-');
            }
            name.push(ch);
            gap = false;
        } else {
            gap = true;
        }
    }
    if name.is_empty() {
        name = DEFAULT_TITLE.replace(' ', "-");
    }
    name.push_str(".html");
    name
}

/// Hands `contents` to the browser as a file download.
pub fn download(file_name: &str, mime_type: &str, contents: &str) -> Result<(), JsValue> {
    let parts = js_sys::Array::of1(&JsValue::from_str(contents));
    let options = web_sys::BlobPropertyBag::new();
    options.set_type(mime_type);
    let blob = web_sys::Blob::new_with_str_sequence_and_options(&parts, &options)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let anchor: web_sys::HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.click();

    web_sys::Url::revoke_object_url(&url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_escaped_and_body_embedded() {
        let page = export_html("Notes <draft> & \"ideas\"", "<h1>Hi</h1>\n");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Notes &lt;draft&gt; &amp; &quot;ideas&quot;</title>"));
        assert!(page.contains("<h1>Hi</h1>"));
        assert!(page.contains("<style>"));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(export_file_name("Weekly report: Q3/Q4"), "Weekly-report-Q3-Q4.html");
        assert_eq!(export_file_name("  notes_v2  "), "notes_v2.html");
        assert_eq!(export_file_name("???"), "Untitled-Document.html");
    }
}
