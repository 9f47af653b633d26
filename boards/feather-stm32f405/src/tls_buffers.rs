//! TLS record buffers in main SRAM
//!
//! **Read buffer (18 KB)**: 16384-byte maximum TLS 1.3 plaintext, 5-byte
//! record header, 16-byte AEAD tag (AES-128-GCM-SHA256) and padding margin.
//!
//! **Write buffer (16 KB)**: we control outgoing record sizes, so the
//! maximum record size is enough.
//!
//! The buffers are handed out once and reused for every hub session.

use static_cell::ConstStaticCell;

const TLS_READ_BUF_SIZE: usize = 18 * 1024;
const TLS_WRITE_BUF_SIZE: usize = 16 * 1024;

static TLS_READ_BUF: ConstStaticCell<[u8; TLS_READ_BUF_SIZE]> =
    ConstStaticCell::new([0; TLS_READ_BUF_SIZE]);
static TLS_WRITE_BUF: ConstStaticCell<[u8; TLS_WRITE_BUF_SIZE]> =
    ConstStaticCell::new([0; TLS_WRITE_BUF_SIZE]);

pub struct TlsBuffers {
    pub read: &'static mut [u8; TLS_READ_BUF_SIZE],
    pub write: &'static mut [u8; TLS_WRITE_BUF_SIZE],
}

/// Take the buffers. Returns `None` after the first call.
pub fn take() -> Option<TlsBuffers> {
    Some(TlsBuffers {
        read: TLS_READ_BUF.try_take()?,
        write: TLS_WRITE_BUF.try_take()?,
    })
}
