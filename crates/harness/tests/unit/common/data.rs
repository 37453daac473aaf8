//! # Data-Port Type Tests
//!
//! Size-class decoding and store-request byte geometry.

use cosim_harness::SimError;
use cosim_harness::common::{SizeClass, StoreRequest};
use rstest::rstest;

#[rstest]
#[case(0, SizeClass::Byte, 1)]
#[case(1, SizeClass::Half, 2)]
#[case(2, SizeClass::Word, 4)]
#[case(3, SizeClass::Double, 8)]
fn test_size_class_decoding(#[case] bits: u8, #[case] class: SizeClass, #[case] bytes: usize) {
    let decoded = SizeClass::from_bits(bits).unwrap();
    assert_eq!(decoded, class);
    assert_eq!(decoded.bytes(), bytes);
}

#[rstest]
#[case(4)]
#[case(7)]
#[case(255)]
fn test_size_class_out_of_range(#[case] bits: u8) {
    assert!(matches!(
        SizeClass::from_bits(bits),
        Err(SimError::InvalidSizeClass(b)) if b == bits
    ));
}

#[test]
fn test_store_request_end_may_reach_top_of_space() {
    let req = StoreRequest::new(0xFFFF_FFF8, 0, SizeClass::Double);
    assert_eq!(req.end(), 1 << 32);
}

#[test]
fn test_store_request_bytes_are_little_endian() {
    let req = StoreRequest::new(0x100, 0x1122_3344_5566_7788, SizeClass::Word);
    assert_eq!(req.le_bytes()[..4], [0x88, 0x77, 0x66, 0x55]);
    assert_eq!(req.end(), 0x104);
}

#[test]
fn test_store_request_display() {
    let req = StoreRequest::new(0x8000_0000, 0xab, SizeClass::Byte);
    assert_eq!(
        req.to_string(),
        "store[1B] 0x80000000 <- 0x00000000000000ab"
    );
}
