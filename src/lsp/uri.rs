//! Template and generated document URIs: `x.templ` <-> `x_templ.go`.

use lsp_types::Url;

pub fn is_template(uri: &str) -> bool {
    uri.ends_with(".templ")
}

pub fn is_generated(uri: &str) -> bool {
    uri.ends_with("_templ.go")
}

pub fn to_generated(uri: &str) -> Option<String> {
    uri.strip_suffix(".templ").map(|stem| format!("{}_templ.go", stem))
}

pub fn to_template(uri: &str) -> Option<String> {
    uri.strip_suffix("_templ.go").map(|stem| format!("{}.templ", stem))
}

pub fn generated_url(uri: &Url) -> Option<Url> {
    to_generated(uri.as_str()).and_then(|s| Url::parse(&s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping() {
        assert_eq!(
            to_generated("file:///p/hello.templ").as_deref(),
            Some("file:///p/hello_templ.go")
        );
        assert_eq!(
            to_template("file:///p/hello_templ.go").as_deref(),
            Some("file:///p/hello.templ")
        );
        assert!(to_template("file:///p/hello.go").is_none());
        assert!(is_template("file:///p/a.templ"));
        assert!(!is_generated("file:///p/a.go"));
    }

    #[test]
    fn test_generated_url() {
        let url = Url::parse("file:///p/x.templ").unwrap();
        assert_eq!(generated_url(&url).unwrap().as_str(), "file:///p/x_templ.go");
    }
}
