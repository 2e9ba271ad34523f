//! End-to-end encode/transcode tests over synthetic front-end output.

use tessera_bitstream::Lcg;
use tessera_encoder::{
    encode, BackendParams, FrontendBlock, FrontendOutput, SliceDescription,
};
use tessera_transcoder::{
    is_format_supported, unpack, Color32, DecodeFlags, Endpoint, Error, Etc1Block, Etc1sBlock,
    SelectorEntry, TexFormat, TextureFormat, TextureType, Transcoder, TranscoderState,
};

fn make_endpoint(lcg: &mut Lcg, max_inten: u32) -> Endpoint {
    Endpoint {
        color5: Color32::new(
            lcg.next_below(32) as u8,
            lcg.next_below(32) as u8,
            lcg.next_below(32) as u8,
            255,
        ),
        inten5: lcg.next_below(max_inten) as u8,
    }
}

fn make_selector(lcg: &mut Lcg) -> SelectorEntry {
    let mut s = SelectorEntry::default();
    for y in 0..4 {
        for x in 0..4 {
            s.set(x, y, lcg.next_below(4) as u8);
        }
    }
    s.init_flags();
    s
}

/// Builds a deterministic front-end result: random palettes, random
/// cluster assignments, and source pixels equal to each block's decoded
/// texels.
fn build_frontend(
    seed: u32,
    num_endpoints: usize,
    num_selectors: usize,
    num_blocks: usize,
    max_inten: u32,
) -> FrontendOutput {
    let mut lcg = Lcg::new(seed);
    let endpoints: Vec<Endpoint> = (0..num_endpoints)
        .map(|_| make_endpoint(&mut lcg, max_inten))
        .collect();
    let selectors: Vec<SelectorEntry> = (0..num_selectors).map(|_| make_selector(&mut lcg)).collect();

    let blocks = (0..num_blocks)
        .map(|_| {
            let e = lcg.next_below(num_endpoints as u32);
            let s = lcg.next_below(num_selectors as u32);
            let logical = Etc1sBlock {
                endpoint0: endpoints[e as usize],
                endpoint1: endpoints[e as usize],
                selector: selectors[s as usize],
                flip: false,
            };
            FrontendBlock {
                endpoint_clusters: [e, e],
                selector_cluster: s,
                source_pixels: logical.decode(),
            }
        })
        .collect();

    FrontendOutput {
        endpoints,
        selectors,
        blocks,
    }
}

fn slice(nbx: u32, nby: u32) -> SliceDescription {
    SliceDescription {
        first_block_index: 0,
        orig_width: nbx * 4,
        orig_height: nby * 4,
        num_blocks_x: nbx,
        num_blocks_y: nby,
        image_index: 0,
        level_index: 0,
        alpha: false,
        iframe: true,
    }
}

fn transcode(
    file: &[u8],
    target: TextureFormat,
    out_units: u32,
) -> Result<Vec<u8>, Error> {
    tessera_transcoder::init();
    let mut transcoder = Transcoder::new();
    transcoder.start_transcoding(file)?;
    let mut state = TranscoderState::new();
    let mut out = vec![0u8; out_units as usize * target.bytes_per_block_or_pixel() as usize];
    transcoder.transcode_image_level(
        &mut state,
        file,
        0,
        0,
        &mut out,
        out_units,
        target,
        DecodeFlags::empty(),
        0,
        0,
    )?;
    Ok(out)
}

#[test]
fn solid_white_block_to_bc1_and_rgba32() {
    let mut selector = SelectorEntry::default();
    for y in 0..4 {
        for x in 0..4 {
            selector.set(x, y, 3);
        }
    }
    selector.init_flags();

    let frontend = FrontendOutput {
        endpoints: vec![Endpoint {
            color5: Color32::new(31, 31, 31, 255),
            inten5: 0,
        }],
        selectors: vec![selector],
        blocks: vec![FrontendBlock {
            endpoint_clusters: [0, 0],
            selector_cluster: 0,
            source_pixels: [Color32::new(255, 255, 255, 255); 16],
        }],
    };

    let file = encode(&frontend, &[slice(1, 1)], &BackendParams::default()).unwrap();

    let bc1 = transcode(&file, TextureFormat::Bc1Rgb, 1).unwrap();
    assert_eq!(bc1, vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);

    let rgba = transcode(&file, TextureFormat::Rgba32, 16).unwrap();
    for px in rgba.chunks(4) {
        assert_eq!(px, [255, 255, 255, 255]);
    }
}

#[test]
fn two_macroblock_slice_round_trips_bit_exact() {
    // 16x8: two macroblocks side by side. With RDO disabled, every block
    // must round-trip through the container bit-exact as raw ETC1.
    let frontend = build_frontend(0xBEEF, 6, 5, 8, 8);
    let params = BackendParams {
        delta_selector_rdo_quality_thresh: 0.0,
        ..BackendParams::default()
    };
    let file = encode(&frontend, &[slice(4, 2)], &params).unwrap();

    let etc1 = transcode(&file, TextureFormat::Etc1Rgb, 8).unwrap();
    for (i, block) in etc1.chunks(8).enumerate() {
        let fb = &frontend.blocks[i];
        let endpoint = frontend.endpoints[fb.endpoint_clusters[0] as usize];
        let mut expected = Etc1Block::default();
        expected.set_diff_bit(true);
        assert!(expected.set_block_color5_check(endpoint.color5, endpoint.color5));
        expected.set_inten_table(0, endpoint.inten5);
        expected.set_inten_table(1, endpoint.inten5);
        expected.bytes[4..8]
            .copy_from_slice(&frontend.selectors[fb.selector_cluster as usize].etc1_bytes);
        assert_eq!(block, expected.bytes, "block {}", i);
    }
}

#[test]
fn uniform_image_exercises_history_rle() {
    // Every selector event after the first hits history index 0, so the
    // whole slice collapses into one sentinel + count (with the Rice
    // overflow path on the larger image).
    for nb in [4u32, 16] {
        let frontend = build_frontend(7, 1, 1, (nb * nb) as usize, 1);
        let file = encode(&frontend, &[slice(nb, nb)], &BackendParams::default()).unwrap();

        let rgba = transcode(&file, TextureFormat::Rgba32, nb * nb * 16).unwrap();
        let logical = Etc1sBlock {
            endpoint0: frontend.endpoints[0],
            endpoint1: frontend.endpoints[0],
            selector: frontend.selectors[0],
            flip: false,
        };
        let texels = logical.decode();
        let width = (nb * 4) as usize;
        for (i, px) in rgba.chunks(4).enumerate() {
            let (x, y) = (i % width, i / width);
            let t = texels[(y % 4) * 4 + (x % 4)];
            assert_eq!(px, [t.r, t.g, t.b, 255], "pixel {},{}", x, y);
        }
    }
}

#[test]
fn non_pow2_pvrtc1_is_rejected_but_bc1_succeeds() {
    // 100x100: 25x25 blocks.
    let frontend = build_frontend(42, 8, 8, 625, 8);
    let mut desc = slice(25, 25);
    desc.orig_width = 100;
    desc.orig_height = 100;
    let file = encode(&frontend, &[desc], &BackendParams::default()).unwrap();

    assert_eq!(
        transcode(&file, TextureFormat::Pvrtc1Rgb4, 625).unwrap_err(),
        Error::IncompatibleTargetDimensions
    );
    transcode(&file, TextureFormat::Bc1Rgb, 625).unwrap();
}

#[test]
fn payload_corruption_is_caught_by_full_validation_only() {
    let frontend = build_frontend(3, 4, 4, 16, 8);
    let mut file = encode(&frontend, &[slice(4, 4)], &BackendParams::default()).unwrap();

    let transcoder = Transcoder::new();
    transcoder.validate_file_checksums(&file, true).unwrap();

    let last = file.len() - 1;
    file[last] ^= 0x10;

    transcoder.validate_header(&file).unwrap();
    assert_eq!(
        transcoder.validate_file_checksums(&file, true).unwrap_err(),
        Error::CrcMismatch
    );
    transcoder.validate_file_checksums(&file, false).unwrap();
}

#[test]
fn capability_matrix_agrees_with_transcode() {
    // 64x64, power of two so PVRTC1 is reachable too.
    let frontend = build_frontend(0x1234, 24, 20, 256, 8);
    let file = encode(&frontend, &[slice(16, 16)], &BackendParams::default()).unwrap();

    tessera_transcoder::init();
    let mut transcoder = Transcoder::new();
    transcoder.start_transcoding(&file).unwrap();

    for raw in 0..27u32 {
        let target: TextureFormat = num_traits::FromPrimitive::from_u32(raw).unwrap();
        let units = if target.is_block_format() {
            let (bw, bh) = target.block_dims();
            (64 / bw.max(1)) * (64 / bh.max(1))
        } else {
            64 * 64
        };
        let mut out =
            vec![0xCDu8; units as usize * target.bytes_per_block_or_pixel() as usize];
        let mut state = TranscoderState::new();
        let result = transcoder.transcode_image_level(
            &mut state,
            &file,
            0,
            0,
            &mut out,
            units,
            target,
            DecodeFlags::empty(),
            0,
            0,
        );

        if is_format_supported(target, TexFormat::Etc1s) {
            result.unwrap_or_else(|e| panic!("{:?} failed: {:?}", target, e));
        } else {
            assert_eq!(result.unwrap_err(), Error::UnsupportedTargetFormat);
            assert!(out.iter().all(|&b| b == 0xCD), "{:?} touched output", target);
        }
    }
}

#[test]
fn block_formats_agree_with_rgba32_within_tolerance() {
    // Moderate intensity tables keep the fit error small enough for a
    // tight cross-format bound.
    let frontend = build_frontend(0xABCD, 12, 10, 64, 4);
    let params = BackendParams {
        delta_selector_rdo_quality_thresh: 0.0,
        ..BackendParams::default()
    };
    let file = encode(&frontend, &[slice(8, 8)], &params).unwrap();

    let rgba = transcode(&file, TextureFormat::Rgba32, 64 * 16).unwrap();
    let bc1 = transcode(&file, TextureFormat::Bc1Rgb, 64).unwrap();
    let atc = transcode(&file, TextureFormat::AtcRgb, 64).unwrap();
    let bc7 = transcode(&file, TextureFormat::Bc7Rgba, 64).unwrap();
    let astc = transcode(&file, TextureFormat::AstcRgba4x4, 64).unwrap();
    let etc1 = transcode(&file, TextureFormat::Etc1Rgb, 64).unwrap();

    let reference = |bx: usize, by: usize| -> Vec<Color32> {
        let mut texels = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                let px = (by * 4 + y) * 32 + bx * 4 + x;
                texels.push(Color32::new(
                    rgba[px * 4],
                    rgba[px * 4 + 1],
                    rgba[px * 4 + 2],
                    rgba[px * 4 + 3],
                ));
            }
        }
        texels
    };

    let check = |name: &str, decoded: &[Color32], expected: &[Color32], tol: i32| {
        for (i, (d, e)) in decoded.iter().zip(expected).enumerate() {
            for c in 0..3 {
                let err = (i32::from(d.comp(c)) - i32::from(e.comp(c))).abs();
                assert!(err <= tol, "{}: texel {} channel {} err {}", name, i, c, err);
            }
        }
    };

    for by in 0..8 {
        for bx in 0..8 {
            let expected = reference(bx, by);
            let block = by * 8 + bx;

            check("bc1", &unpack_bc1_vec(&bc1[block * 8..block * 8 + 8]), &expected, 8);
            check("atc", &unpack::unpack_atc(&atc[block * 8..block * 8 + 8]), &expected, 10);
            check(
                "bc7",
                &unpack::unpack_bc7_mode5(&bc7[block * 16..block * 16 + 16]).unwrap(),
                &expected,
                8,
            );
            check(
                "astc",
                &unpack::unpack_astc(&astc[block * 16..block * 16 + 16]).unwrap(),
                &expected,
                8,
            );

            // ETC1 is the identity arc: exact.
            let mut packed = Etc1Block::default();
            packed.bytes.copy_from_slice(&etc1[block * 8..block * 8 + 8]);
            check("etc1", &packed.decode(), &expected, 0);
        }
    }
}

fn unpack_bc1_vec(block: &[u8]) -> Vec<Color32> {
    unpack::unpack_bc1(block).to_vec()
}

#[test]
fn pvrtc1_stays_within_coarse_tolerance() {
    let frontend = build_frontend(0x77, 6, 6, 64, 3);
    let params = BackendParams {
        delta_selector_rdo_quality_thresh: 0.0,
        ..BackendParams::default()
    };
    let file = encode(&frontend, &[slice(8, 8)], &params).unwrap();

    let rgba = transcode(&file, TextureFormat::Rgba32, 64 * 16).unwrap();
    let pvrtc = transcode(&file, TextureFormat::Pvrtc1Rgb4, 64).unwrap();
    let decoded = unpack::unpack_pvrtc1(&pvrtc, 8, 8);

    // PVRTC smears across blocks; verify it stays recognizably close.
    let mut total_err = 0u64;
    for (i, px) in decoded.iter().enumerate() {
        for c in 0..3 {
            let err = (i32::from(px.comp(c)) - i32::from(rgba[i * 4 + c])).abs();
            total_err += err as u64;
        }
    }
    let avg = total_err as f64 / (decoded.len() * 3) as f64;
    assert!(avg <= 32.0, "average channel error {}", avg);
}

#[test]
fn alpha_slices_feed_composite_formats() {
    let color = build_frontend(0x51, 6, 6, 16, 4);
    let mut lcg = Lcg::new(0x52);

    // Grayscale alpha palette (alpha rides the green channel).
    let alpha_endpoints: Vec<Endpoint> = (0..4)
        .map(|_| {
            let v = lcg.next_below(32) as u8;
            Endpoint {
                color5: Color32::new(v, v, v, 255),
                inten5: lcg.next_below(4) as u8,
            }
        })
        .collect();
    let alpha_selectors: Vec<SelectorEntry> = (0..4).map(|_| make_selector(&mut lcg)).collect();

    let mut frontend = color;
    let alpha_endpoint_base = frontend.endpoints.len() as u32;
    let alpha_selector_base = frontend.selectors.len() as u32;
    frontend.endpoints.extend_from_slice(&alpha_endpoints);
    frontend.selectors.extend_from_slice(&alpha_selectors);
    for _ in 0..16 {
        let e = alpha_endpoint_base + lcg.next_below(4);
        let s = alpha_selector_base + lcg.next_below(4);
        let logical = Etc1sBlock {
            endpoint0: frontend.endpoints[e as usize],
            endpoint1: frontend.endpoints[e as usize],
            selector: frontend.selectors[s as usize],
            flip: false,
        };
        frontend.blocks.push(FrontendBlock {
            endpoint_clusters: [e, e],
            selector_cluster: s,
            source_pixels: logical.decode(),
        });
    }

    let slices = [
        SliceDescription {
            first_block_index: 0,
            orig_width: 16,
            orig_height: 16,
            num_blocks_x: 4,
            num_blocks_y: 4,
            image_index: 0,
            level_index: 0,
            alpha: false,
            iframe: true,
        },
        SliceDescription {
            first_block_index: 16,
            orig_width: 16,
            orig_height: 16,
            num_blocks_x: 4,
            num_blocks_y: 4,
            image_index: 0,
            level_index: 0,
            alpha: true,
            iframe: true,
        },
    ];

    let params = BackendParams {
        delta_selector_rdo_quality_thresh: 0.0,
        ..BackendParams::default()
    };
    let file = encode(&frontend, &slices, &params).unwrap();

    let rgba = transcode(&file, TextureFormat::Rgba32, 256).unwrap();

    // Alpha must come from the alpha slice's green channel.
    let mut any_translucent = false;
    for (i, px) in rgba.chunks(4).enumerate() {
        let (x, y) = (i % 16, i / 16);
        let block = 16 + (y / 4) * 4 + x / 4;
        let fb = &frontend.blocks[block];
        let expected = fb.source_pixels[(y % 4) * 4 + (x % 4)].g;
        assert_eq!(px[3], expected);
        if px[3] != 255 {
            any_translucent = true;
        }
    }
    assert!(any_translucent);

    // BC3: alpha block then color block.
    let bc3 = transcode(&file, TextureFormat::Bc3Rgba, 16).unwrap();
    for block in 0..16usize {
        let decoded = unpack::unpack_bc3(&bc3[block * 16..block * 16 + 16]);
        let alpha_block = &frontend.blocks[16 + block];
        for (i, texel) in decoded.iter().enumerate() {
            let expected = alpha_block.source_pixels[i].g;
            let err = (i32::from(texel.a) - i32::from(expected)).abs();
            assert!(err <= 24, "bc3 alpha block {} texel {} err {}", block, i, err);
        }
    }

    // ETC2 RGBA: EAC alpha block then ETC1 color block.
    let etc2 = transcode(&file, TextureFormat::Etc2Rgba, 16).unwrap();
    for block in 0..16usize {
        let alpha = unpack::unpack_eac(&etc2[block * 16..block * 16 + 8]);
        let alpha_block = &frontend.blocks[16 + block];
        for (i, &a) in alpha.iter().enumerate() {
            let expected = alpha_block.source_pixels[i].g;
            let err = (i32::from(a) - i32::from(expected)).abs();
            assert!(err <= 24, "etc2 alpha block {} texel {} err {}", block, i, err);
        }
    }
}

#[test]
fn video_pframe_requires_reference_frame() {
    let mut frontend = build_frontend(0x99, 4, 4, 8, 4);
    // Two frames of 2x2 blocks each.
    frontend.blocks.truncate(8);

    let slices = [
        SliceDescription {
            first_block_index: 0,
            orig_width: 8,
            orig_height: 8,
            num_blocks_x: 2,
            num_blocks_y: 2,
            image_index: 0,
            level_index: 0,
            alpha: false,
            iframe: true,
        },
        SliceDescription {
            first_block_index: 4,
            orig_width: 8,
            orig_height: 8,
            num_blocks_x: 2,
            num_blocks_y: 2,
            image_index: 1,
            level_index: 0,
            alpha: false,
            iframe: false,
        },
    ];
    let params = BackendParams {
        tex_type: TextureType::VideoFrames,
        us_per_frame: 33333,
        ..BackendParams::default()
    };
    let file = encode(&frontend, &slices, &params).unwrap();

    tessera_transcoder::init();
    let mut transcoder = Transcoder::new();
    transcoder.start_transcoding(&file).unwrap();

    let mut out = vec![0u8; 4 * 8];
    let mut state = TranscoderState::new();

    // P-frame first: no reference frame yet.
    assert_eq!(
        transcoder
            .transcode_image_level(
                &mut state,
                &file,
                1,
                0,
                &mut out,
                4,
                TextureFormat::Etc1Rgb,
                DecodeFlags::empty(),
                0,
                0,
            )
            .unwrap_err(),
        Error::InvalidSlice
    );

    // After the I-frame, the P-frame decodes.
    transcoder
        .transcode_image_level(
            &mut state,
            &file,
            0,
            0,
            &mut out,
            4,
            TextureFormat::Etc1Rgb,
            DecodeFlags::empty(),
            0,
            0,
        )
        .unwrap();
    transcoder
        .transcode_image_level(
            &mut state,
            &file,
            1,
            0,
            &mut out,
            4,
            TextureFormat::Etc1Rgb,
            DecodeFlags::empty(),
            0,
            0,
        )
        .unwrap();
}

#[test]
fn deterministic_encode_and_output_buffer_checks() {
    let frontend = build_frontend(11, 5, 5, 16, 8);
    let params = BackendParams::default();
    let a = encode(&frontend, &[slice(4, 4)], &params).unwrap();
    let b = encode(&frontend, &[slice(4, 4)], &params).unwrap();
    assert_eq!(a, b);

    tessera_transcoder::init();
    let mut transcoder = Transcoder::new();

    // Not ready before start_transcoding.
    let mut out = vec![0u8; 16 * 8];
    let mut state = TranscoderState::new();
    assert_eq!(
        transcoder
            .transcode_image_level(
                &mut state,
                &a,
                0,
                0,
                &mut out,
                16,
                TextureFormat::Etc1Rgb,
                DecodeFlags::empty(),
                0,
                0,
            )
            .unwrap_err(),
        Error::NotReady
    );

    transcoder.start_transcoding(&a).unwrap();

    // Short buffer is rejected up front.
    let mut short = vec![0u8; 8];
    assert_eq!(
        transcoder
            .transcode_image_level(
                &mut state,
                &a,
                0,
                0,
                &mut short,
                1,
                TextureFormat::Etc1Rgb,
                DecodeFlags::empty(),
                0,
                0,
            )
            .unwrap_err(),
        Error::OutputBufferTooSmall
    );
}

#[test]
fn file_info_reports_geometry_and_codebooks() {
    let frontend = build_frontend(21, 7, 9, 16, 8);
    let file = encode(&frontend, &[slice(4, 4)], &BackendParams::default()).unwrap();

    let transcoder = Transcoder::new();
    let info = transcoder.get_file_info(&file).unwrap();
    assert_eq!(info.total_images, 1);
    assert_eq!(info.total_endpoints, 7);
    assert_eq!(info.total_selectors, 9);
    assert_eq!(info.image_mipmap_levels, vec![1]);
    assert!(info.etc1s);
    assert!(!info.has_alpha_slices);
    assert_eq!(info.slice_info.len(), 1);
    assert_eq!(info.slice_info[0].num_blocks_x, 4);
    assert_eq!(info.slice_info[0].orig_width, 16);

    let level = transcoder.get_image_level_info(&file, 0, 0).unwrap();
    assert_eq!(level.total_blocks, 16);

    assert_eq!(transcoder.get_total_images(&file).unwrap(), 1);
    assert_eq!(transcoder.get_total_image_levels(&file, 0).unwrap(), 1);
    assert_eq!(
        transcoder.get_image_level_desc(&file, 0, 0).unwrap(),
        (16, 16, 16)
    );
    assert_eq!(
        transcoder.get_texture_type(&file).unwrap(),
        TextureType::TwoD
    );
}
