//! Guard-paged allocations.
//!
//! A [`GuardedRegion`] hands out a writable content window flanked by pages
//! mapped with no access. A device or host write that strays past either
//! end of the window hits a guard page and faults the process instead of
//! corrupting neighbouring memory. Nothing here catches that fault; the
//! point is to make it reliably reachable.
//!
//! ```text
//!  | guard | content pages + slack pages | guard |
//!          ^ Alignment::Left                   ^ Alignment::Right (content ends here)
//! ```

use core::fmt;
use core::ptr::NonNull;
use std::ffi::OsStr;
use std::io;
use std::sync::Once;

use tracing::{debug, info};

/// Environment variable that selects [`Alignment::Right`] in
/// [`GuardOptions::from_env`]. Any value other than empty or `0` enables it.
pub const ALIGN_RIGHT_ENV: &str = "CL_ALIGN_RIGHT";

/// Where the content window sits inside the usable pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Content starts right after the leading guard band. Underruns fault
    /// on the first byte; overruns fault once they leave the rounded pages.
    #[default]
    Left,
    /// Content ends flush against the trailing guard band, so the first
    /// byte past the end faults even when the size is not page aligned.
    Right,
}

/// Layout options for [`GuardedRegion::allocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct GuardOptions {
    /// No-access pages on each side. At least one.
    pub guard_pages: usize,
    /// Extra usable pages between the content and one guard band.
    pub slack_pages: usize,
    /// Which end of the usable span the content touches.
    pub alignment: Alignment,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            guard_pages: 1,
            slack_pages: 0,
            alignment: Alignment::Left,
        }
    }
}

impl GuardOptions {
    /// Image layout: one guard page per side plus four pages of slack, so
    /// a device that walks a padded row pitch past the nominal image size
    /// still lands in mapped memory that the caller can inspect.
    pub fn for_image() -> Self {
        Self::default().with_slack_pages(4)
    }

    /// Default options with the alignment taken from [`ALIGN_RIGHT_ENV`].
    pub fn from_env() -> Self {
        Self::default().with_env_alignment()
    }

    /// Replace the alignment with the one [`ALIGN_RIGHT_ENV`] selects,
    /// keeping the page counts.
    pub fn with_env_alignment(self) -> Self {
        self.with_alignment(alignment_from_env())
    }

    /// Set the no-access pages on each side.
    pub fn with_guard_pages(mut self, pages: usize) -> Self {
        self.guard_pages = pages;
        self
    }

    /// Set the usable pages past the content.
    pub fn with_slack_pages(mut self, pages: usize) -> Self {
        self.slack_pages = pages;
        self
    }

    /// Set which guard band the content abuts.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }
}

static ALIGNMENT_NOTICE: Once = Once::new();

fn alignment_from_env() -> Alignment {
    let alignment = parse_alignment(std::env::var_os(ALIGN_RIGHT_ENV).as_deref());
    ALIGNMENT_NOTICE.call_once(|| {
        info!(?alignment, "guarded allocations use {ALIGN_RIGHT_ENV} alignment setting");
    });
    alignment
}

fn parse_alignment(value: Option<&OsStr>) -> Alignment {
    match value {
        Some(v) if !v.is_empty() && v != "0" => Alignment::Right,
        _ => Alignment::Left,
    }
}

/// Errors from [`GuardedRegion::allocate`].
///
/// These mean the test environment is broken, not that the device under
/// test misbehaved. Callers propagate them and abort the test.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GuardError {
    #[error("guard options need at least one guard page per side")]
    NoGuardPages,
    #[error("guarded allocation of {size} bytes overflows the address space")]
    SizeOverflow { size: usize },
    #[error("mapping {len} bytes failed: {source}")]
    Map {
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("protecting guard band at offset {offset} failed: {source}")]
    Protect {
        offset: usize,
        #[source]
        source: io::Error,
    },
}

/// Platform page size in bytes.
pub fn page_size() -> usize {
    sys::page_size()
}

/// An exclusively owned allocation with no-access guard bands.
///
/// The whole mapping is released in one call when the region is dropped,
/// on every exit path of the owning test.
pub struct GuardedRegion {
    base: NonNull<u8>,
    mapped_len: usize,
    offset: usize,
    len: usize,
    usable: core::ops::Range<usize>,
    options: GuardOptions,
    #[cfg(not(unix))]
    _heap: Box<[u8]>,
}

// SAFETY: the region owns its mapping outright; nothing else holds the
// pointer, so moving it to another thread is the same as moving a Vec.
unsafe impl Send for GuardedRegion {}

impl GuardedRegion {
    /// Allocate `size` content bytes between guard bands.
    ///
    /// Content is zero-initialized. On platforms without page protection
    /// this falls back to a plain heap allocation and
    /// [`is_protected`](Self::is_protected) reports `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the size overflows, or
    /// the platform refuses the mapping or protection change.
    pub fn allocate(size: usize, options: GuardOptions) -> Result<Self, GuardError> {
        if options.guard_pages == 0 {
            return Err(GuardError::NoGuardPages);
        }
        let page = page_size();
        let overflow = || GuardError::SizeOverflow { size };

        let content_pages = size.div_ceil(page);
        let usable_pages = content_pages
            .checked_add(options.slack_pages)
            .ok_or_else(overflow)?;
        let usable_len = usable_pages.checked_mul(page).ok_or_else(overflow)?;
        let guard_len = options.guard_pages.checked_mul(page).ok_or_else(overflow)?;
        let mapped_len = guard_len
            .checked_mul(2)
            .and_then(|g| g.checked_add(usable_len))
            .ok_or_else(overflow)?;

        let usable = guard_len..guard_len + usable_len;
        let offset = match options.alignment {
            Alignment::Left => usable.start,
            Alignment::Right => usable.end - size,
        };

        let region = sys::allocate(mapped_len, guard_len, usable.clone(), offset, size, options)?;
        debug!(
            size,
            mapped_len,
            offset,
            alignment = ?options.alignment,
            protected = region.is_protected(),
            "allocated guarded region"
        );
        Ok(region)
    }

    /// Release the mapping now. Equivalent to dropping the region.
    pub fn release(self) {}

    /// Content length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-byte region.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total bytes reserved, guard bands included.
    #[inline]
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// Which guard band the content abuts.
    #[inline]
    pub fn alignment(&self) -> Alignment {
        self.options.alignment
    }

    /// Options the region was allocated with.
    #[inline]
    pub fn options(&self) -> GuardOptions {
        self.options
    }

    /// Whether the guard bands are really mapped no-access.
    #[inline]
    pub fn is_protected(&self) -> bool {
        cfg!(unix)
    }

    /// Accessible bytes between the leading guard band and the content.
    #[inline]
    pub fn slack_before(&self) -> usize {
        self.offset - self.usable.start
    }

    /// Accessible bytes between the content and the trailing guard band.
    #[inline]
    pub fn slack_after(&self) -> usize {
        self.usable.end - (self.offset + self.len)
    }

    /// Pointer to the first content byte.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: `offset <= mapped_len` by construction.
        unsafe { self.base.as_ptr().add(self.offset) }
    }

    /// Mutable pointer to the first content byte, for handing to a driver.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: `offset <= mapped_len` by construction.
        unsafe { self.base.as_ptr().add(self.offset) }
    }

    /// The content bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `[offset, offset + len)` lies inside the readable and
        // writable part of the mapping, which lives as long as `self`.
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// The content bytes, writable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }
}

impl fmt::Debug for GuardedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GuardedRegion({} bytes, {:?}, mapped {} bytes, protected: {})",
            self.len,
            self.options.alignment,
            self.mapped_len,
            self.is_protected()
        )
    }
}

#[cfg(unix)]
impl Drop for GuardedRegion {
    fn drop(&mut self) {
        // SAFETY: `base`/`mapped_len` describe exactly the mapping created
        // in `sys::allocate`, and no borrow of it can outlive `self`.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.mapped_len) };
        if rc != 0 {
            tracing::error!(
                mapped_len = self.mapped_len,
                error = %io::Error::last_os_error(),
                "munmap of guarded region failed"
            );
        } else {
            debug!(mapped_len = self.mapped_len, "released guarded region");
        }
    }
}

#[cfg(unix)]
mod sys {
    use super::*;

    pub(super) fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    }

    pub(super) fn allocate(
        mapped_len: usize,
        guard_len: usize,
        usable: core::ops::Range<usize>,
        offset: usize,
        len: usize,
        options: GuardOptions,
    ) -> Result<GuardedRegion, GuardError> {
        // SAFETY: anonymous private mapping, no address hint, no fd.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(GuardError::Map {
                len: mapped_len,
                source: io::Error::last_os_error(),
            });
        }
        let Some(base) = NonNull::new(ptr.cast::<u8>()) else {
            return Err(GuardError::Map {
                len: mapped_len,
                source: io::Error::other("mmap returned null"),
            });
        };

        // Owned from here on: any early return below unmaps via Drop.
        let region = GuardedRegion {
            base,
            mapped_len,
            offset,
            len,
            usable: usable.clone(),
            options,
        };
        for start in [0, usable.end] {
            // SAFETY: `[start, start + guard_len)` is inside the mapping.
            let rc = unsafe {
                libc::mprotect(
                    base.as_ptr().add(start).cast(),
                    guard_len,
                    libc::PROT_NONE,
                )
            };
            if rc != 0 {
                return Err(GuardError::Protect {
                    offset: start,
                    source: io::Error::last_os_error(),
                });
            }
        }
        Ok(region)
    }
}

#[cfg(not(unix))]
mod sys {
    use super::*;

    static UNPROTECTED_NOTICE: Once = Once::new();

    pub(super) fn page_size() -> usize {
        4096
    }

    pub(super) fn allocate(
        _mapped_len: usize,
        _guard_len: usize,
        _usable: core::ops::Range<usize>,
        _offset: usize,
        len: usize,
        options: GuardOptions,
    ) -> Result<GuardedRegion, GuardError> {
        UNPROTECTED_NOTICE.call_once(|| {
            tracing::warn!("page protection unavailable; guarded regions are plain allocations");
        });
        let mut heap = vec![0u8; len].into_boxed_slice();
        let Some(base) = NonNull::new(heap.as_mut_ptr()) else {
            return Err(GuardError::Map {
                len,
                source: io::Error::other("allocation returned null"),
            });
        };
        Ok(GuardedRegion {
            base,
            mapped_len: len,
            offset: 0,
            len,
            usable: 0..len,
            options,
            _heap: heap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let page = page_size();
        assert!(page >= 4096);
        assert!(page.is_power_of_two());
    }

    #[test]
    fn content_is_zeroed_and_writable() {
        let mut region = GuardedRegion::allocate(1000, GuardOptions::default()).unwrap();
        assert_eq!(region.len(), 1000);
        assert!(region.as_slice().iter().all(|&b| b == 0));
        region.as_mut_slice().fill(0xAB);
        assert!(region.as_slice().iter().all(|&b| b == 0xAB));
    }

    #[cfg(unix)]
    #[test]
    fn left_alignment_layout() {
        let page = page_size();
        let region = GuardedRegion::allocate(page + 10, GuardOptions::default()).unwrap();
        assert_eq!(region.mapped_len(), 4 * page);
        assert_eq!(region.slack_before(), 0);
        assert_eq!(region.slack_after(), page - 10);
        assert_eq!(region.as_ptr() as usize % page, 0);
    }

    #[cfg(unix)]
    #[test]
    fn right_alignment_layout() {
        let page = page_size();
        let options = GuardOptions::default().with_alignment(Alignment::Right);
        let region = GuardedRegion::allocate(page + 10, options).unwrap();
        assert_eq!(region.slack_after(), 0);
        assert_eq!(region.slack_before(), page - 10);
        assert_eq!((region.as_ptr() as usize + region.len()) % page, 0);
    }

    #[cfg(unix)]
    #[test]
    fn image_options_add_slack() {
        let page = page_size();
        let region = GuardedRegion::allocate(page, GuardOptions::for_image()).unwrap();
        assert_eq!(region.mapped_len(), 7 * page);
        assert_eq!(region.slack_after(), 4 * page);

        let right = GuardOptions::for_image().with_alignment(Alignment::Right);
        let region = GuardedRegion::allocate(page, right).unwrap();
        assert_eq!(region.slack_before(), 4 * page);
        assert_eq!(region.slack_after(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn wide_guard_bands() {
        let page = page_size();
        let options = GuardOptions::default().with_guard_pages(3);
        let region = GuardedRegion::allocate(1, options).unwrap();
        assert_eq!(region.mapped_len(), 7 * page);
        assert!(region.is_protected());
    }

    #[test]
    fn alignment_toggle_values() {
        assert_eq!(parse_alignment(None), Alignment::Left);
        assert_eq!(parse_alignment(Some(OsStr::new(""))), Alignment::Left);
        assert_eq!(parse_alignment(Some(OsStr::new("0"))), Alignment::Left);
        assert_eq!(parse_alignment(Some(OsStr::new("1"))), Alignment::Right);
        assert_eq!(parse_alignment(Some(OsStr::new("yes"))), Alignment::Right);
    }

    #[test]
    fn env_alignment_keeps_page_counts() {
        let expected = parse_alignment(std::env::var_os(ALIGN_RIGHT_ENV).as_deref());
        let options = GuardOptions::for_image().with_env_alignment();
        assert_eq!(options.guard_pages, 1);
        assert_eq!(options.slack_pages, 4);
        assert_eq!(options.alignment, expected);
        assert_eq!(GuardOptions::from_env().alignment, expected);
        assert_eq!(GuardOptions::from_env().slack_pages, 0);

        let right = GuardOptions::for_image().with_alignment(Alignment::Right);
        assert_eq!(right.with_env_alignment().alignment, expected);
    }

    #[test]
    fn zero_guard_pages_rejected() {
        let err = GuardedRegion::allocate(16, GuardOptions::default().with_guard_pages(0));
        assert!(matches!(err, Err(GuardError::NoGuardPages)));
    }

    #[test]
    fn size_overflow_rejected() {
        let err = GuardedRegion::allocate(usize::MAX - 1, GuardOptions::default());
        assert!(matches!(err, Err(GuardError::SizeOverflow { .. })));
    }

    #[test]
    fn empty_region() {
        let region = GuardedRegion::allocate(0, GuardOptions::default()).unwrap();
        assert!(region.is_empty());
        assert!(region.as_slice().is_empty());
        region.release();
    }

    #[test]
    fn region_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<GuardedRegion>();
    }
}
