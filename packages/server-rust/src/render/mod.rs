//! Response bodies for the domain directory in structured or HTML form.
//!
//! Both forms are produced from the same outcome values. The HTML form is a
//! plain fragment per resource with every user-influenced string escaped.

pub mod escape;
pub mod negotiate;

use std::fmt::Write as _;

use vmctl_core::sxp::MIME_TYPE;
use vmctl_core::{DomainHandle, Sxp};

use crate::service::{
    canonical_url, DomainDirectory, DomainResource, OperationError, OperationOutcome, ServiceNode,
};

pub use escape::escape_html;
pub use negotiate::{AcceptHeaderNegotiator, ContentNegotiator};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Which representation a response uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Structured,
    Html,
}

impl ContentMode {
    #[must_use]
    pub fn from_structured(structured: bool) -> Self {
        if structured {
            Self::Structured
        } else {
            Self::Html
        }
    }
}

/// A response body with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content_type: &'static str,
    pub body: String,
}

impl Rendered {
    fn structured(value: &Sxp) -> Self {
        Self {
            content_type: MIME_TYPE,
            body: value.to_string(),
        }
    }

    fn html(body: String) -> Self {
        Self {
            content_type: HTML_CONTENT_TYPE,
            body,
        }
    }
}

/// Renders directory resources in one negotiated [`ContentMode`].
#[derive(Debug, Clone, Copy)]
pub struct ContentRenderer {
    mode: ContentMode,
}

impl ContentRenderer {
    #[must_use]
    pub fn new(mode: ContentMode) -> Self {
        Self { mode }
    }

    /// The directory itself: the list of domain names, or in HTML a full page
    /// with the path, static children, a domain table and the operation forms.
    #[must_use]
    pub fn directory(&self, directory: &DomainDirectory, directory_url: &str) -> Rendered {
        match self.mode {
            ContentMode::Structured => structured_listing(&directory.list_names()),
            ContentMode::Html => {
                html_directory_page(directory.node(), directory_url, &directory.list_sorted())
            }
        }
    }

    /// Body of a successful create or restore.
    #[must_use]
    pub fn outcome(&self, outcome: &OperationOutcome) -> Rendered {
        if self.mode == ContentMode::Structured {
            return Rendered::structured(&outcome.handle().to_sxp());
        }

        let handle = outcome.handle();
        let mut out = format!(
            "<p> Created <a href=\"{}\">Domain {}</a></p>\n",
            escape_html(outcome.location()),
            escape_html(&handle.name)
        );
        if let OperationOutcome::Created { config_text, .. } = outcome {
            let _ = writeln!(out, "<p><pre>\n{}\n</pre></p>", escape_html(config_text));
        }
        Rendered::html(out)
    }

    /// Body of a failed operation or resolution.
    #[must_use]
    pub fn failure(&self, error: &OperationError) -> Rendered {
        match self.mode {
            ContentMode::Structured => Rendered::structured(&Sxp::list([
                Sxp::atom("err"),
                Sxp::atom(error.to_string()),
            ])),
            ContentMode::Html => Rendered::html(format!(
                "<html><head></head><body><p>{}</p></body></html>",
                escape_html(&error.to_string())
            )),
        }
    }

    /// One resolved domain.
    #[must_use]
    pub fn domain(&self, resource: &DomainResource) -> Rendered {
        let handle = resource.handle();
        match self.mode {
            ContentMode::Structured => Rendered::structured(&handle.to_sxp()),
            ContentMode::Html => Rendered::html(format!(
                "<html><head></head><body><h2>Domain {}</h2>\
                 <p>id = {}, memory = {}, ssidref = {}.</p></body></html>",
                escape_html(&handle.name),
                handle.domid,
                handle.memory_target,
                handle.ssidref
            )),
        }
    }

    /// A statically registered child of the directory, listed by its own
    /// children.
    #[must_use]
    pub fn static_node(&self, node: &ServiceNode, node_url: &str) -> Rendered {
        match self.mode {
            ContentMode::Structured => Rendered::structured(&Sxp::list(
                node.children().iter().map(|child| Sxp::atom(child.segment())),
            )),
            ContentMode::Html => {
                let mut out = String::from("<html><head></head><body>");
                write_path(&mut out, node_url);
                write_children(&mut out, node, node_url);
                out.push_str("</body></html>");
                Rendered::html(out)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Listing bodies
// ---------------------------------------------------------------------------

fn structured_listing(names: &[String]) -> Rendered {
    Rendered::structured(&Sxp::list(names.iter().map(Sxp::atom)))
}

fn html_directory_page(node: &ServiceNode, directory_url: &str, domains: &[DomainHandle]) -> Rendered {
    let mut out = String::from("<html><head></head><body>");
    write_path(&mut out, directory_url);
    write_children(&mut out, node, directory_url);
    write_domains(&mut out, directory_url, domains);
    write_forms(&mut out, directory_url);
    out.push_str("</body></html>");
    Rendered::html(out)
}

fn write_domains(out: &mut String, directory_url: &str, domains: &[DomainHandle]) {
    out.push_str("<ul>");
    for d in domains {
        let _ = write!(
            out,
            "<li><a href=\"{}\">Domain {}</a>: id = {}, memory = {}, ssidref = {}.</li>",
            escape_html(&canonical_url(directory_url, &d.name)),
            escape_html(&d.name),
            d.domid,
            d.memory_target,
            d.ssidref
        );
    }
    out.push_str("</ul>");
}

fn write_forms(out: &mut String, directory_url: &str) {
    let action = escape_html(directory_url);
    let _ = write!(
        out,
        "<form method=\"post\" action=\"{action}\" enctype=\"multipart/form-data\">\
         <button type=\"submit\" name=\"op\" value=\"create\">Create Domain</button>\
         Config <input type=\"file\" name=\"config\"><br></form>\
         <form method=\"post\" action=\"{action}\" enctype=\"multipart/form-data\">\
         <button type=\"submit\" name=\"op\" value=\"restore\">Restore Domain</button>\
         State <input type=\"text\" name=\"file\"><br></form>"
    );
}

/// Static children as links. Nothing is written for a node without children.
fn write_children(out: &mut String, node: &ServiceNode, node_url: &str) {
    if node.children().is_empty() {
        return;
    }
    out.push_str("<ul class=\"children\">");
    for child in node.children() {
        let _ = write!(
            out,
            "<li><a href=\"{}\">{}</a></li>",
            escape_html(&canonical_url(node_url, child.segment())),
            escape_html(child.segment())
        );
    }
    out.push_str("</ul>");
}

/// The path of `url` as a breadcrumb of links, one per segment.
fn write_path(out: &mut String, url: &str) {
    let path = url_path(url);
    out.push_str("<h1><a href=\"/\">/</a>");
    let mut prefix = String::new();
    for (index, segment) in path.split('/').filter(|s| !s.is_empty()).enumerate() {
        prefix.push('/');
        prefix.push_str(segment);
        if index > 0 {
            out.push('/');
        }
        let _ = write!(
            out,
            "<a href=\"{}\">{}</a>",
            escape_html(&prefix),
            escape_html(segment)
        );
    }
    out.push_str("</h1>");
}

/// Path component of an absolute or path-only URL.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map_or("/", |start| &rest[start..])
        }
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    fn handle(name: &str, domid: u32) -> DomainHandle {
        DomainHandle {
            name: name.to_string(),
            domid,
            memory_target: 64,
            ssidref: 0,
        }
    }

    fn directory_node() -> ServiceNode {
        ServiceNode::new("domain")
    }

    const URL: &str = "http://localhost:8000/xend/domain";

    #[test]
    fn empty_listing_renders_empty_containers() {
        let html = html_directory_page(&directory_node(), URL, &[]);
        assert_eq!(html.content_type, HTML_CONTENT_TYPE);
        assert!(html.body.contains("<ul></ul>"));

        let sxp = structured_listing(&[]);
        assert_eq!(sxp.content_type, "application/sxp");
        assert_eq!(sxp.body, "()");
    }

    #[test]
    fn html_listing_entry_links_to_domain() {
        let html = html_directory_page(&directory_node(), URL, &[handle("test1", 3)]);
        assert!(html.body.contains(
            "<li><a href=\"http://localhost:8000/xend/domain/test1\">Domain test1</a>: \
             id = 3, memory = 64, ssidref = 0.</li>"
        ));
    }

    #[test]
    fn html_listing_escapes_names() {
        let html = html_directory_page(&directory_node(), URL, &[handle("<b>x</b>", 1)]);
        assert!(!html.body.contains("<b>"));
        assert!(html.body.contains("Domain &lt;b&gt;x&lt;/b&gt;"));
        assert!(html.body.contains("href=\"http://localhost:8000/xend/domain/%3Cb%3Ex%3C%2Fb%3E\""));
    }

    #[test]
    fn directory_page_has_both_forms_and_path() {
        let html = html_directory_page(&directory_node(), URL, &[]).body;
        assert!(html.contains("name=\"op\" value=\"create\""));
        assert!(html.contains("type=\"file\" name=\"config\""));
        assert!(html.contains("name=\"op\" value=\"restore\""));
        assert!(html.contains("name=\"file\""));
        assert!(html.contains("action=\"http://localhost:8000/xend/domain\""));
        assert!(html.contains(
            "<h1><a href=\"/\">/</a><a href=\"/xend\">xend</a>/<a href=\"/xend/domain\">domain</a></h1>"
        ));
    }

    #[test]
    fn directory_page_lists_static_children() {
        let mut node = directory_node();
        node.add_child(ServiceNode::new("stats")).unwrap();
        let html = html_directory_page(&node, "/xend/domain", &[]).body;
        assert!(html.contains("<li><a href=\"/xend/domain/stats\">stats</a></li>"));
    }

    #[test]
    fn created_outcome_shows_config_verbatim() {
        let outcome = OperationOutcome::Created {
            handle: handle("test1", 1),
            location: format!("{URL}/test1"),
            config_text: "(vm (name test1) (memory 64))".to_string(),
        };

        let html = ContentRenderer::new(ContentMode::Html).outcome(&outcome).body;
        assert!(html.starts_with(
            "<p> Created <a href=\"http://localhost:8000/xend/domain/test1\">Domain test1</a></p>"
        ));
        assert!(html.contains("<pre>\n(vm (name test1) (memory 64))\n</pre>"));

        let sxp = ContentRenderer::new(ContentMode::Structured).outcome(&outcome);
        assert_eq!(sxp.body, "(domain (domid 1) (name test1) (memory 64) (ssidref 0))");
    }

    #[test]
    fn restored_outcome_is_link_only() {
        let outcome = OperationOutcome::Restored {
            handle: handle("web1", 2),
            location: format!("{URL}/web1"),
        };
        let html = ContentRenderer::new(ContentMode::Html).outcome(&outcome).body;
        assert!(html.contains("Domain web1</a>"));
        assert!(!html.contains("<pre>"));
    }

    #[test]
    fn failure_bodies() {
        let err = OperationError::UnknownOperation {
            name: "<bogus>".to_string(),
        };
        let sxp = ContentRenderer::new(ContentMode::Structured).failure(&err);
        assert_eq!(sxp.body, "(err \"Unknown operation: <bogus>\")");

        let html = ContentRenderer::new(ContentMode::Html).failure(&err);
        assert!(html.body.contains("<p>Unknown operation: &lt;bogus&gt;</p>"));
    }

    #[test]
    fn static_node_lists_children() {
        let mut node = ServiceNode::new("stats");
        node.add_child(ServiceNode::new("cpu")).unwrap();
        node.add_child(ServiceNode::new("memory")).unwrap();
        let sxp = ContentRenderer::new(ContentMode::Structured).static_node(&node, "/xend/domain/stats");
        assert_eq!(sxp.body, "(cpu memory)");
    }

    #[test]
    fn url_path_strips_scheme_and_host() {
        assert_eq!(url_path("http://h:8000/xend/domain"), "/xend/domain");
        assert_eq!(url_path("https://h"), "/");
        assert_eq!(url_path("/xend/domain"), "/xend/domain");
    }

    fn html_names(body: &str) -> BTreeSet<String> {
        body.split("\">Domain ")
            .skip(1)
            .filter_map(|rest| rest.split("</a>").next())
            .map(ToString::to_string)
            .collect()
    }

    proptest! {
        #[test]
        fn both_listings_name_the_same_domains(
            names in proptest::collection::btree_set("[a-z][a-z0-9-]{0,11}", 0..8)
        ) {
            let mut domains: Vec<_> = names
                .iter()
                .enumerate()
                .map(|(i, n)| handle(n, u32::try_from(i).unwrap() + 1))
                .collect();
            domains.sort_by(|a, b| a.name.cmp(&b.name));
            // Structured listings may come back in any order.
            let unordered: Vec<String> = names.iter().rev().cloned().collect();

            let html = html_directory_page(&directory_node(), URL, &domains);
            let sxp = structured_listing(&unordered);

            let parsed = vmctl_core::sxp::parse(&sxp.body).unwrap();
            let structured: BTreeSet<String> = parsed
                .as_list()
                .unwrap()
                .iter()
                .filter_map(|item| item.as_atom().map(ToString::to_string))
                .collect();

            prop_assert_eq!(html_names(&html.body), names.clone());
            prop_assert_eq!(structured, names);
        }
    }
}
