use keepsake_crypto::media::{
    ChunkedMedia, DEFAULT_CHUNK_SIZE, LegacyWholeFile, PlaintextMedia, seal_legacy_media,
};
use keepsake_crypto::{
    CryptoError, MasterKey, MediaContext, MediaDecoder, TryDecode, encrypt_media_chunked,
};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

fn master() -> MasterKey {
    MasterKey::from_bytes(&[0x42; 32]).unwrap()
}

// ── Key hierarchy ───────────────────────────────────────────────

#[test]
fn master_key_rejects_wrong_length() {
    let err = MasterKey::from_bytes(&[0u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 16
        }
    ));
}

#[test]
fn generated_master_keys_differ() {
    assert_ne!(MasterKey::generate(), MasterKey::generate());
}

#[test]
fn file_keys_are_per_stem() {
    let m = master();
    assert_eq!(m.file_key("IMG_1").unwrap(), m.file_key("IMG_1").unwrap());
    assert_ne!(m.file_key("IMG_1").unwrap(), m.file_key("IMG_2").unwrap());
}

// ── Chunked stream ──────────────────────────────────────────────

#[test]
fn chunked_roundtrip_across_frames() {
    let m = master();
    let key = m.file_key("clip").unwrap();
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let enc = encrypt_media_chunked(&data, &key, 1024).unwrap();

    let ctx = MediaContext {
        master: Some(&m),
        key_id: "clip",
    };
    assert_eq!(ChunkedMedia.try_decode(&enc, &ctx).unwrap(), data);
}

#[test]
fn chunked_empty_input_has_final_frame() {
    let m = master();
    let enc = encrypt_media_chunked(b"", &m.file_key("e").unwrap(), DEFAULT_CHUNK_SIZE).unwrap();
    let ctx = MediaContext {
        master: Some(&m),
        key_id: "e",
    };
    assert!(ChunkedMedia.try_decode(&enc, &ctx).unwrap().is_empty());
    assert!(ChunkedMedia.try_decode(&enc[..1], &ctx).is_err());
}

#[test]
fn chunked_stream_cut_at_frame_boundary_is_rejected() {
    let m = master();
    let key = m.file_key("clip").unwrap();
    let data = vec![7u8; 300];
    let enc = encrypt_media_chunked(&data, &key, 100).unwrap();

    // version byte + two complete frames of (4 + 12 + 100 + 16) bytes
    let frame = 4 + 12 + 100 + 16;
    let cut = &enc[..1 + 2 * frame];

    let ctx = MediaContext {
        master: Some(&m),
        key_id: "clip",
    };
    assert!(ChunkedMedia.try_decode(cut, &ctx).is_err());
}

#[test]
fn chunked_requires_master_key() {
    let m = master();
    let enc = encrypt_media_chunked(b"x", &m.file_key("a").unwrap(), 16).unwrap();
    let ctx = MediaContext {
        master: None,
        key_id: "a",
    };
    assert!(matches!(
        ChunkedMedia.try_decode(&enc, &ctx),
        Err(CryptoError::KeyDerivation(_))
    ));
}

// ── Strategy chain ──────────────────────────────────────────────

#[test]
fn default_decoder_order() {
    assert_eq!(
        MediaDecoder::default().strategy_names(),
        vec!["plaintext", "chunked", "legacy-whole-file"]
    );
}

#[test]
fn plaintext_media_is_passed_through() {
    let decoded = MediaDecoder::default()
        .decode(
            JPEG,
            &MediaContext {
                master: None,
                key_id: "photo",
            },
        )
        .unwrap();
    assert_eq!(decoded.strategy, "plaintext");
    assert_eq!(decoded.bytes, JPEG);
}

#[test]
fn each_layout_is_decoded_by_its_strategy() {
    let m = master();
    let ctx = MediaContext {
        master: Some(&m),
        key_id: "IMG_0007",
    };
    let key = m.file_key("IMG_0007").unwrap();
    let decoder = MediaDecoder::default();

    let chunked = encrypt_media_chunked(JPEG, &key, 4).unwrap();
    let d = decoder.decode(&chunked, &ctx).unwrap();
    assert_eq!((d.strategy, d.bytes.as_slice()), ("chunked", JPEG));

    let legacy = seal_legacy_media(JPEG, &key).unwrap();
    let d = decoder.decode(&legacy, &ctx).unwrap();
    assert_eq!((d.strategy, d.bytes.as_slice()), ("legacy-whole-file", JPEG));
}

#[test]
fn wrong_stem_fails_every_strategy() {
    let m = master();
    let legacy = seal_legacy_media(b"not media", &m.file_key("a").unwrap()).unwrap();
    let ctx = MediaContext {
        master: Some(&m),
        key_id: "b",
    };
    assert!(matches!(
        MediaDecoder::default().decode(&legacy, &ctx),
        Err(CryptoError::AuthenticationFailure)
    ));
}

#[test]
fn custom_chain_respects_order() {
    let m = master();
    let ctx = MediaContext {
        master: Some(&m),
        key_id: "x",
    };
    let legacy_only = MediaDecoder::with_strategies(vec![Box::new(LegacyWholeFile)]);
    assert!(legacy_only.decode(JPEG, &ctx).is_err());

    let plain_only = MediaDecoder::with_strategies(vec![Box::new(PlaintextMedia)]);
    assert!(plain_only.decode(JPEG, &ctx).is_ok());
}
