//! Binary wire format for `load_mask` / `save_mask`.
//!
//! ```text
//! [0xFE][mask bytes: w*h][user-edit bytes: w*h][0xFE]
//! ```
//!
//! A payload that does not fit this layout means "no mask yet" rather than
//! an error: a never-annotated image is the normal case.

use iris_common::MaskShape;
use tracing::warn;

use crate::{
    error::{MaskError, Result},
    types::MaskBuffers,
};

/// Byte that opens and closes every mask payload
pub const SENTINEL: u8 = 254;

/// Smallest payload that can carry a one-pixel mask
pub const MIN_PAYLOAD_LEN: usize = 4;

/// Wire length of a mask with `pixels` pixels
pub fn encoded_len(pixels: usize) -> usize {
    2 * pixels + 2
}

/// Serialize both buffers into the sentinel-wrapped envelope.
/// User-edit bytes are normalised to 0/1.
pub fn encode(buffers: &MaskBuffers) -> Vec<u8> {
    let len = buffers.len();
    let mut payload = Vec::with_capacity(encoded_len(len));
    payload.push(SENTINEL);
    payload.extend_from_slice(buffers.mask());
    payload.extend(buffers.user().iter().map(|&flag| u8::from(flag != 0)));
    payload.push(SENTINEL);
    payload
}

/// Split an envelope back into its buffers; `None` for anything malformed
pub fn decode(bytes: &[u8]) -> Option<MaskBuffers> {
    if bytes.len() < MIN_PAYLOAD_LEN {
        return None;
    }
    if bytes[0] != SENTINEL || bytes[bytes.len() - 1] != SENTINEL {
        return None;
    }
    let interior = bytes.len() - 2;
    if interior % 2 != 0 {
        return None;
    }

    let mask_len = interior / 2;
    let mask = bytes[1..=mask_len].to_vec();
    let user = bytes[mask_len + 1..bytes.len() - 1].to_vec();
    MaskBuffers::new(mask, user).ok()
}

/// Decode and also require the buffers to match the configured shape
pub fn decode_for_shape(bytes: &[u8], shape: MaskShape) -> Option<MaskBuffers> {
    let buffers = decode(bytes)?;
    if buffers.len() != shape.len() {
        warn!(
            expected = shape.len(),
            actual = buffers.len(),
            "Saved mask does not match the configured mask shape, ignoring it"
        );
        return None;
    }
    Some(buffers)
}

/// Validate a raw `predict_mask` response: one class byte per pixel, no
/// sentinels and no user-edit half.
pub fn decode_prediction(bytes: &[u8], shape: MaskShape) -> Result<Vec<u8>> {
    if bytes.len() != shape.len() {
        return Err(MaskError::PredictionLength {
            expected: shape.len(),
            actual: bytes.len(),
        });
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_by_two_zero_mask() {
        let shape = MaskShape::new(2, 2).unwrap();
        let buffers = MaskBuffers::zeroed(shape.len()).unwrap();
        let payload = encode(&buffers);
        assert_eq!(payload, vec![254, 0, 0, 0, 0, 0, 0, 0, 0, 254]);

        let decoded = decode(&payload).expect("valid payload");
        assert_eq!(decoded.mask(), &[0, 0, 0, 0]);
        assert_eq!(decoded.user(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_user_flags_are_normalised() {
        let buffers = MaskBuffers::new(vec![3, 1], vec![0, 9]).unwrap();
        assert_eq!(encode(&buffers), vec![254, 3, 1, 0, 1, 254]);
    }

    #[test]
    fn test_short_payloads_are_absent() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[254]).is_none());
        assert!(decode(&[254, 254]).is_none());
        assert!(decode(&[254, 0, 254]).is_none());
    }

    #[test]
    fn test_bad_sentinels_are_absent() {
        assert!(decode(&[0, 1, 1, 254]).is_none());
        assert!(decode(&[254, 1, 1, 0]).is_none());
    }

    #[test]
    fn test_odd_interior_is_absent() {
        assert!(decode(&[254, 1, 2, 3, 254]).is_none());
    }

    #[test]
    fn test_smallest_payload() {
        let decoded = decode(&[254, 5, 1, 254]).unwrap();
        assert_eq!(decoded.mask(), &[5]);
        assert_eq!(decoded.user(), &[1]);
    }

    #[test]
    fn test_decode_for_shape_rejects_other_sizes() {
        let payload = encode(&MaskBuffers::zeroed(6).unwrap());
        assert!(decode_for_shape(&payload, MaskShape::new(3, 2).unwrap()).is_some());
        assert!(decode_for_shape(&payload, MaskShape::new(2, 2).unwrap()).is_none());
    }

    #[test]
    fn test_prediction_length() {
        let shape = MaskShape::new(2, 2).unwrap();
        assert_eq!(decode_prediction(&[1, 2, 3, 4], shape).unwrap(), vec![1, 2, 3, 4]);
        assert!(matches!(
            decode_prediction(&[254, 1, 2, 3, 4, 254], shape),
            Err(MaskError::PredictionLength { expected: 4, actual: 6 })
        ));
    }

    fn mask_and_user() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
        (1usize..256).prop_flat_map(|len| {
            (
                prop::collection::vec(any::<u8>(), len),
                prop::collection::vec(0u8..=1, len),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode((mask, user) in mask_and_user()) {
            let buffers = MaskBuffers::new(mask.clone(), user.clone()).unwrap();
            let payload = encode(&buffers);
            prop_assert_eq!(payload.len(), encoded_len(mask.len()));
            let decoded = decode(&payload).unwrap();
            prop_assert_eq!(decoded.mask(), mask.as_slice());
            prop_assert_eq!(decoded.user(), user.as_slice());
        }

        #[test]
        fn prop_wrong_sentinel_is_absent(mut bytes in prop::collection::vec(any::<u8>(), 4..64)) {
            bytes[0] = 0;
            prop_assert!(decode(&bytes).is_none());
        }
    }
}
