use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::data::cache::{CacheScope, DataCache};
use crate::error::SsrError;
use crate::hydration::boot::{BootLatch, BootOutcome};
use crate::hydration::scripts::SyncKind;

static PROTOCOL_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<script data-cache-sync="(stream|bulk)">__syncCache\((\[.*?\])\)</script>|<script data-boot>[^<]*</script>|</html>"#,
    )
    .expect("Valid regex pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub kind: SyncKind,
    pub pairs: Vec<(String, String)>,
}

/// Browser-side view of the bootstrap protocol, driven from response bytes.
///
/// Mirrors what the page does: sync instructions land in `window.dataCaches`
/// until the bundle installs `putCache`, the boot directive and the bundle
/// load meet in a [`BootLatch`], and the cache content at boot is recorded.
#[derive(Debug)]
pub struct ClientMirror {
    cache: Arc<DataCache>,
    installer_registered: bool,
    buffered: Vec<(String, String)>,
    latch: BootLatch,
    document: String,
    scanned: usize,
    closed: bool,
    cache_at_boot: Option<Vec<(String, String)>>,
    syncs: Vec<SyncRecord>,
}

impl Default for ClientMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMirror {
    pub fn new() -> Self {
        Self {
            cache: DataCache::shared(CacheScope::Process),
            installer_registered: false,
            buffered: Vec::new(),
            latch: BootLatch::new(),
            document: String::new(),
            scanned: 0,
            closed: false,
            cache_at_boot: None,
            syncs: Vec::new(),
        }
    }

    /// Appends response bytes and applies every protocol event they complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), SsrError> {
        let text = std::str::from_utf8(chunk).map_err(|error| {
            SsrError::serialization(format!("response chunk is not valid UTF-8: {error}"))
        })?;
        self.document.push_str(text);

        let mut events = Vec::new();
        for captures in PROTOCOL_EVENT.captures_iter(&self.document[self.scanned..]) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let end = whole.end();
            let event = match (captures.get(1), captures.get(2)) {
                (Some(kind), Some(payload)) => {
                    let kind = SyncKind::parse(kind.as_str()).ok_or_else(|| {
                        SsrError::validation(format!("unknown sync kind '{}'", kind.as_str()))
                    })?;
                    let pairs: Vec<(String, String)> = serde_json::from_str(payload.as_str())?;
                    Event::Sync(SyncRecord { kind, pairs })
                }
                _ if whole.as_str() == "</html>" => Event::Close,
                _ => Event::Boot,
            };
            events.push((end, event));
        }

        let base = self.scanned;
        for (end, event) in events {
            self.scanned = base + end;
            self.apply(event);
        }
        Ok(())
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Sync(record) => {
                if self.installer_registered {
                    self.cache.rehydrate(record.pairs.iter().cloned());
                } else {
                    self.buffered.extend(record.pairs.iter().cloned());
                }
                self.syncs.push(record);
            }
            Event::Boot => {
                let outcome = self.latch.content_delivered();
                self.record_boot(outcome);
            }
            Event::Close => self.closed = true,
        }
    }

    /// The client bundle finished loading: the cache installer runs first,
    /// then the bundle registers its boot function.
    pub fn load_bundle(&mut self) {
        if !self.installer_registered {
            self.cache.rehydrate(std::mem::take(&mut self.buffered));
            self.installer_registered = true;
        }
        let outcome = self.latch.bundle_ready();
        self.record_boot(outcome);
    }

    fn record_boot(&mut self, outcome: BootOutcome) {
        if outcome == BootOutcome::Booted {
            self.cache_at_boot = Some(self.cache.snapshot());
        }
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    /// Values the page could see when it booted; `None` before boot.
    pub fn cache_at_boot(&self) -> Option<&[(String, String)]> {
        self.cache_at_boot.as_deref()
    }

    pub fn buffered(&self) -> &[(String, String)] {
        &self.buffered
    }

    pub fn boot_count(&self) -> usize {
        self.latch.boot_count()
    }

    pub fn is_booted(&self) -> bool {
        self.latch.is_booted()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn syncs(&self) -> &[SyncRecord] {
        &self.syncs
    }

    pub fn sync_count(&self, kind: SyncKind) -> usize {
        self.syncs.iter().filter(|record| record.kind == kind).count()
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

enum Event {
    Sync(SyncRecord),
    Boot,
    Close,
}
