use cow_utils::CowUtils;

use crate::render::node::Element;

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "link", "meta"];

pub fn escape_text(text: &str) -> String {
    text.cow_replace('&', "&amp;").cow_replace('<', "&lt;").cow_replace('>', "&gt;").into_owned()
}

pub fn escape_html_attribute(text: &str) -> String {
    text.cow_replace('&', "&amp;")
        .cow_replace('"', "&quot;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .into_owned()
}

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn push_open_tag(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(element.tag);
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_html_attribute(value));
            out.push('"');
        }
    }
    out.push('>');
}

pub fn push_close_tag(out: &mut String, element: &Element) {
    if is_void(element.tag) {
        return;
    }
    out.push_str("</");
    out.push_str(element.tag);
    out.push('>');
}
