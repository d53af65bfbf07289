use std::sync::atomic::{AtomicU64, Ordering};

// Global counters (low overhead). These are coarse-grained and process-wide.
static ROUTED: AtomicU64 = AtomicU64::new(0);
static PAGED: AtomicU64 = AtomicU64::new(0);
static DEPAGED: AtomicU64 = AtomicU64::new(0);
static DROPPED_ADDRESS_FULL: AtomicU64 = AtomicU64::new(0);
static ACKNOWLEDGED: AtomicU64 = AtomicU64::new(0);
static REDELIVERED: AtomicU64 = AtomicU64::new(0);
static PAGE_SEGMENTS_CREATED: AtomicU64 = AtomicU64::new(0);
static PAGE_SEGMENTS_DELETED: AtomicU64 = AtomicU64::new(0);
static MANAGEMENT_SCANS: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn inc_routed(n: u64) {
    ROUTED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_paged(n: u64) {
    PAGED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_depaged(n: u64) {
    DEPAGED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_dropped_address_full(n: u64) {
    DROPPED_ADDRESS_FULL.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_acknowledged(n: u64) {
    ACKNOWLEDGED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_redelivered(n: u64) {
    REDELIVERED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_page_segments_created(n: u64) {
    PAGE_SEGMENTS_CREATED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_page_segments_deleted(n: u64) {
    PAGE_SEGMENTS_DELETED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_management_scans(n: u64) {
    MANAGEMENT_SCANS.fetch_add(n, Ordering::Relaxed);
}

pub fn snapshot() -> String {
    // Simple text format (Prometheus-style without HELP/TYPE lines for brevity)
    format!(
        "pagemq_routed {}\npagemq_paged {}\npagemq_depaged {}\npagemq_dropped_address_full {}\npagemq_acknowledged {}\npagemq_redelivered {}\npagemq_page_segments_created {}\npagemq_page_segments_deleted {}\npagemq_management_scans {}\n",
        ROUTED.load(Ordering::Relaxed),
        PAGED.load(Ordering::Relaxed),
        DEPAGED.load(Ordering::Relaxed),
        DROPPED_ADDRESS_FULL.load(Ordering::Relaxed),
        ACKNOWLEDGED.load(Ordering::Relaxed),
        REDELIVERED.load(Ordering::Relaxed),
        PAGE_SEGMENTS_CREATED.load(Ordering::Relaxed),
        PAGE_SEGMENTS_DELETED.load(Ordering::Relaxed),
        MANAGEMENT_SCANS.load(Ordering::Relaxed),
    )
}
