//! Writer/Reader roundtrip and bounds matrix for the buffers crate.

use nethook_buffers::{print_octets, BufferError, Reader, Writer};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Writer/Reader roundtrip matrix
// ---------------------------------------------------------------------------

#[test]
fn roundtrip_mixed_widths() {
    let mut w = Writer::new();
    w.u8(0xff);
    w.i16(-2);
    w.u32(0x8000_0000 | 5514);
    w.i32(i32::MIN);
    w.u64(u64::MAX);
    w.f32(1.5);
    w.f64(-0.25);
    let data = w.flush();

    let mut r = Reader::new(&data);
    assert_eq!(r.u8(), Ok(0xff));
    assert_eq!(r.i16(), Ok(-2));
    assert_eq!(r.u32(), Ok(0x8000_0000 | 5514));
    assert_eq!(r.i32(), Ok(i32::MIN));
    assert_eq!(r.u64(), Ok(u64::MAX));
    assert_eq!(r.f32(), Ok(1.5));
    assert_eq!(r.f64(), Ok(-0.25));
    assert!(r.is_empty());
}

#[test]
fn cut_then_read_past_child_end() {
    let mut w = Writer::new();
    w.u32(3);
    w.buf(&[1, 2, 3, 4, 5]);
    let data = w.flush();

    let mut r = Reader::new(&data);
    let len = r.u32().unwrap() as usize;
    let mut child = r.cut(len).unwrap();
    assert_eq!(child.buf(3), Ok(&[1u8, 2, 3][..]));
    assert_eq!(
        child.u8(),
        Err(BufferError::EndOfBuffer {
            offset: 7,
            needed: 1,
            available: 0,
        })
    );
    assert_eq!(r.rest(), &[4u8, 5][..]);
}

#[test]
fn print_octets_preview() {
    let preview = print_octets(&[0xde, 0xad, 0xbe, 0xef], 2);
    assert_eq!(preview, "de ad... (2 more)");
}

proptest! {
    #[test]
    fn reads_never_pass_end(
        data in proptest::collection::vec(any::<u8>(), 0..64),
        widths in proptest::collection::vec(0usize..5, 0..32),
    ) {
        let mut r = Reader::new(&data);
        for w in widths {
            let before = r.x;
            let ok = match w {
                0 => r.u8().is_ok(),
                1 => r.u16().is_ok(),
                2 => r.u32().is_ok(),
                3 => r.u64().is_ok(),
                _ => r.buf(5).is_ok(),
            };
            if !ok {
                prop_assert_eq!(r.x, before);
            }
            prop_assert!(r.x <= data.len());
        }
    }
}
