//! Cleanup of README HTML rendered by the GitHub markdown API

use regex::{Captures, Regex};

/// Rewrites rendered README HTML so it can be embedded outside GitHub
pub struct ReadmeProcessor {
    permalink_icon_re: Regex,
    empty_anchor_re: Regex,
    article_re: Regex,
    announce_re: Regex,
    link_re: Regex,
}

impl ReadmeProcessor {
    pub fn new() -> Self {
        Self {
            permalink_icon_re: Regex::new(
                r#"(?si)<svg aria-hidden="true" class="octicon octicon-link"[^>]*>.*?<\s*/\s*svg>"#,
            )
            .unwrap(),
            empty_anchor_re: Regex::new(r"(?si)<a[^>]*><\s*/\s*a>").unwrap(),
            article_re: Regex::new(r"(?si)<article[^>]*>(.*)<\s*/\s*article>").unwrap(),
            announce_re: Regex::new(r#"(?si)<div class="announce[^>]*>(.*)<\s*/\s*div>\s*$"#)
                .unwrap(),
            link_re: Regex::new(r#"(href|src)="([^"]*)""#).unwrap(),
        }
    }

    /// Strip GitHub chrome from `html` and make relative links absolute
    /// against the raw content of `org/repo` on `master`.
    pub fn process(&self, org: &str, repo: &str, html: &str) -> String {
        let base = format!("https://raw.githubusercontent.com/{}/{}/master/", org, repo);

        let content = html.trim();
        let content = self.permalink_icon_re.replace_all(content, "");
        let content = self.empty_anchor_re.replace_all(&content, "");
        let content = self.article_re.replace_all(&content, "$1");
        let content = self.announce_re.replace_all(&content, "$1");
        let content = self.link_re.replace_all(&content, |caps: &Captures<'_>| {
            let attribute = &caps[1];
            let target = &caps[2];
            if is_absolute(target) {
                caps[0].to_string()
            } else {
                format!(
                    r#"{}="{}{}""#,
                    attribute,
                    base,
                    target.trim_start_matches('/')
                )
            }
        });

        content.trim().to_string()
    }
}

impl Default for ReadmeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_absolute(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("data:")
        || target.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        r#"<a href="/foo">Foo</a>"#,
        r#"<a href="https://raw.githubusercontent.com/acme/widgets/master/foo">Foo</a>"#
    )]
    #[case(
        r#"<img src="docs/logo.png">"#,
        r#"<img src="https://raw.githubusercontent.com/acme/widgets/master/docs/logo.png">"#
    )]
    #[case(r#"<a href="https://example.com/x">x</a>"#, r#"<a href="https://example.com/x">x</a>"#)]
    #[case(r#"<a href="http://example.com/x">x</a>"#, r#"<a href="http://example.com/x">x</a>"#)]
    #[case(r##"<a href="#usage">Usage</a>"##, r##"<a href="#usage">Usage</a>"##)]
    #[case(r#"<img src="data:image/png;base64,AAAA">"#, r#"<img src="data:image/png;base64,AAAA">"#)]
    fn process_rewrites_relative_links(#[case] input: &str, #[case] expected: &str) {
        let processor = ReadmeProcessor::new();
        assert_eq!(processor.process("acme", "widgets", input), expected);
    }

    #[test]
    fn process_strips_permalink_icons_and_empty_anchors() {
        let processor = ReadmeProcessor::new();
        let html = r##"<h2><a id="user-content-install" class="anchor" href="#install"><svg aria-hidden="true" class="octicon octicon-link" height="16"><path d="M4"></path></svg></a>Install</h2>
<p><a name="top"></a>Text</p>"##;

        let result = processor.process("acme", "widgets", html);

        assert_eq!(result, "<h2>Install</h2>\n<p>Text</p>");
    }

    #[test]
    fn process_unwraps_article_and_trailing_announcement() {
        let processor = ReadmeProcessor::new();
        let html = r#"
            <article class="markdown-body entry-content"><p>Body</p></article>
        "#;

        assert_eq!(processor.process("acme", "widgets", html), "<p>Body</p>");

        let html = r#"<p>Body</p><div class="announce instapaper_body md">Notice</div>"#;
        assert_eq!(
            processor.process("acme", "widgets", html),
            "<p>Body</p>Notice"
        );
    }

    #[test]
    fn process_trims_surrounding_whitespace() {
        let processor = ReadmeProcessor::new();
        assert_eq!(processor.process("acme", "widgets", "\n  <p>x</p>\n"), "<p>x</p>");
    }
}
