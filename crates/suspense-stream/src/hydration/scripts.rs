use cow_utils::CowUtils;

use crate::error::SsrError;
use crate::render::node::{Node, raw};

/// Runs the client bundle if it already registered itself, otherwise leaves a
/// flag the bundle checks when it finishes loading.
pub const BOOT_DIRECTIVE: &str = "window.BOOT ? BOOT() : (window.LOADED = true)";

/// Defined in the document head so sync instructions can run before any bundle.
pub const SYNC_RUNTIME: &str = r#"function __syncCache(p){if(window.putCache){for(var i=0;i<p.length;i++){window.putCache(p[i][0],p[i][1]);}}else{window.dataCaches=(window.dataCaches||[]).concat(p.map(function(e){return {key:e[0],value:e[1]};}));}}"#;

/// `$RC` swaps a resolved segment into its boundary, `$RX` marks a boundary as
/// failed and leaves the fallback in place.
pub const BOUNDARY_RUNTIME: &str = r#"$RC=window.$RC||function(b,s){var t=document.getElementById(b),c=document.getElementById(s);if(!t||!c)return;var a=t.previousSibling,p=t.parentNode,n=t.nextSibling,d=0;while(n){var x=n.nextSibling;if(n.nodeType===8){if(n.data==="/$"){if(d===0)break;d--;}else if(n.data.charAt(0)==="$"){d++;}}p.removeChild(n);n=x;}while(c.firstChild)p.insertBefore(c.firstChild,n);p.removeChild(t);c.parentNode.removeChild(c);if(a&&a.nodeType===8)a.data="$";document.dispatchEvent(new CustomEvent("ssr:boundary",{detail:b}));};$RX=window.$RX||function(b,m){var t=document.getElementById(b);if(!t)return;var a=t.previousSibling;if(a&&a.nodeType===8)a.data="$!";t.setAttribute("data-msg",m||"");};"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// One value, emitted next to the markup that read it.
    Stream,
    /// Every fulfilled value of a per-request cache, emitted once at stream end.
    Bulk,
}

impl SyncKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Bulk => "bulk",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stream" => Some(Self::Stream),
            "bulk" => Some(Self::Bulk),
            _ => None,
        }
    }
}

/// JSON that is safe to place inside an inline `<script>` element.
pub fn script_safe_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, SsrError> {
    let json = serde_json::to_string(value)?;
    Ok(json
        .cow_replace('<', "\\u003c")
        .cow_replace('>', "\\u003e")
        .cow_replace('&', "\\u0026")
        .cow_replace('\u{2028}', "\\u2028")
        .cow_replace('\u{2029}', "\\u2029")
        .into_owned())
}

pub fn boot_script() -> String {
    format!("<script data-boot>{BOOT_DIRECTIVE}</script>")
}

pub fn boundary_runtime_script() -> String {
    format!("<script>{BOUNDARY_RUNTIME}</script>")
}

pub fn cache_sync_script(kind: SyncKind, pairs: &[(String, String)]) -> Result<String, SsrError> {
    let payload = script_safe_json(pairs)?;
    Ok(format!(
        r#"<script data-cache-sync="{}">__syncCache({payload})</script>"#,
        kind.as_str()
    ))
}

/// Inline instruction mirroring a single value into the client cache.
pub fn cache_sync_node(key: &str, value: &str) -> Result<Node, SsrError> {
    let pair = [(key.to_string(), value.to_string())];
    Ok(raw(cache_sync_script(SyncKind::Stream, &pair)?))
}

pub fn completion_script(boundary_id: &str, segment_id: &str) -> String {
    format!(r#"<script>$RC("{boundary_id}","{segment_id}")</script>"#)
}

pub fn error_script(boundary_id: &str, message: &str) -> Result<String, SsrError> {
    Ok(format!(r#"<script>$RX("{boundary_id}",{})</script>"#, script_safe_json(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_script() {
        assert_eq!(
            boot_script(),
            "<script data-boot>window.BOOT ? BOOT() : (window.LOADED = true)</script>"
        );
    }

    #[test]
    fn test_cache_sync_script_format() {
        let pairs = vec![
            ("fizzbuzz".to_string(), "zzubzzif1".to_string()),
            ("foobar".to_string(), "raboof1".to_string()),
        ];
        let script = cache_sync_script(SyncKind::Bulk, &pairs).unwrap();

        assert_eq!(
            script,
            r#"<script data-cache-sync="bulk">__syncCache([["fizzbuzz","zzubzzif1"],["foobar","raboof1"]])</script>"#
        );
    }

    #[test]
    fn test_values_cannot_close_the_script() {
        let pairs = vec![("k".to_string(), "</script><script>alert(1)".to_string())];
        let script = cache_sync_script(SyncKind::Stream, &pairs).unwrap();

        assert_eq!(script.matches("</script>").count(), 1);
        assert!(script.contains("\\u003c/script\\u003e"));

        let payload = script
            .trim_start_matches(r#"<script data-cache-sync="stream">__syncCache("#)
            .trim_end_matches(")</script>");
        let decoded: Vec<(String, String)> = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn test_line_separators_are_escaped() {
        let json = script_safe_json("a\u{2028}b\u{2029}c").unwrap();
        assert_eq!(json, r#""a\u2028b\u2029c""#);
    }

    #[test]
    fn test_boundary_scripts() {
        assert_eq!(completion_script("B:0", "S:0"), r#"<script>$RC("B:0","S:0")</script>"#);
        assert_eq!(
            error_script("B:1", "render timed out").unwrap(),
            r#"<script>$RX("B:1","render timed out")</script>"#
        );
        assert!(boundary_runtime_script().starts_with("<script>$RC="));
    }

    #[test]
    fn test_sync_kind_parse() {
        assert_eq!(SyncKind::parse("stream"), Some(SyncKind::Stream));
        assert_eq!(SyncKind::parse("bulk"), Some(SyncKind::Bulk));
        assert_eq!(SyncKind::parse("other"), None);
    }
}
