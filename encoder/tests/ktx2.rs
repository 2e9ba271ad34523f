//! KTX2 wrapping: the same codebook and slice streams, relocated into a
//! KTX2 supercompression global data block, must decode identically to
//! the native `.basis` layout.

use tessera_bitstream::Lcg;
use tessera_encoder::{
    encode, encode_sections, BackendParams, FrontendBlock, FrontendOutput, SliceDescription,
};
use tessera_transcoder::{
    Color32, DecodeFlags, Endpoint, Etc1sBlock, SelectorEntry, TextureFormat, TextureType,
    Transcoder, TranscoderState,
};

fn build_frontend(seed: u32, num_blocks: usize) -> FrontendOutput {
    let mut lcg = Lcg::new(seed);
    let endpoints: Vec<Endpoint> = (0..8)
        .map(|_| Endpoint {
            color5: Color32::new(
                lcg.next_below(32) as u8,
                lcg.next_below(32) as u8,
                lcg.next_below(32) as u8,
                255,
            ),
            inten5: lcg.next_below(8) as u8,
        })
        .collect();
    let selectors: Vec<SelectorEntry> = (0..8)
        .map(|_| {
            let mut s = SelectorEntry::default();
            for y in 0..4 {
                for x in 0..4 {
                    s.set(x, y, lcg.next_below(4) as u8);
                }
            }
            s.init_flags();
            s
        })
        .collect();

    let blocks = (0..num_blocks)
        .map(|_| {
            let e = lcg.next_below(8);
            let s = lcg.next_below(8);
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

struct Writer(Vec<u8>);

impl Writer {
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
}

/// Hand-assembles a KTX2 file with BasisLZ supercompression from the
/// backend's payload sections.
fn wrap_ktx2(
    output: &tessera_encoder::BackendOutput,
    width: u32,
    height: u32,
) -> Vec<u8> {
    const IDENTIFIER: [u8; 12] = [
        0xAB, b'K', b'T', b'X', b' ', b'2', b'0', 0xBB, b'\r', b'\n', 0x1A, b'\n',
    ];

    // One level, one image, no alpha.
    let level_data = output.slice_image_data[0].clone();

    // Global data: counts, section lengths, one image descriptor, then
    // the endpoint/selector/table sections.
    let mut sgd = Writer(Vec::new());
    sgd.u32((output.num_endpoints as u32) | ((output.num_selectors as u32) << 16));
    sgd.u32(output.endpoint_palette.len() as u32);
    sgd.u32(output.selector_palette.len() as u32);
    sgd.u32(output.slice_image_tables.len() as u32);
    sgd.u32(0); // extended
    sgd.u32(0); // imageFlags
    sgd.u32(0); // rgbSliceByteOffset
    sgd.u32(level_data.len() as u32);
    sgd.u32(0); // alphaSliceByteOffset
    sgd.u32(0); // alphaSliceByteLength
    sgd.0.extend_from_slice(&output.endpoint_palette);
    sgd.0.extend_from_slice(&output.selector_palette);
    sgd.0.extend_from_slice(&output.slice_image_tables);

    let header_size = 12 + 9 * 4 + 4 * 4 + 2 * 8;
    let level_index_size = 24;
    let sgd_ofs = (header_size + level_index_size) as u64;
    let level_ofs = sgd_ofs + sgd.0.len() as u64;

    let mut file = Writer(Vec::new());
    file.0.extend_from_slice(&IDENTIFIER);
    file.u32(0); // vkFormat: VK_FORMAT_UNDEFINED
    file.u32(1); // typeSize
    file.u32(width);
    file.u32(height);
    file.u32(0); // pixelDepth
    file.u32(0); // layerCount
    file.u32(1); // faceCount
    file.u32(1); // levelCount
    file.u32(1); // supercompressionScheme: BasisLZ
    file.u32(0); // dfdByteOffset
    file.u32(0); // dfdByteLength
    file.u32(0); // kvdByteOffset
    file.u32(0); // kvdByteLength
    file.u64(sgd_ofs);
    file.u64(sgd.0.len() as u64);
    // Level index.
    file.u64(level_ofs);
    file.u64(level_data.len() as u64);
    file.u64(level_data.len() as u64);

    assert_eq!(file.0.len() as u64, sgd_ofs);
    file.0.extend_from_slice(&sgd.0);
    file.0.extend_from_slice(&level_data);
    file.0
}

#[test]
fn ktx2_and_basis_decode_identically() {
    let frontend = build_frontend(0xD00D, 64);
    let desc = SliceDescription {
        first_block_index: 0,
        orig_width: 32,
        orig_height: 32,
        num_blocks_x: 8,
        num_blocks_y: 8,
        image_index: 0,
        level_index: 0,
        alpha: false,
        iframe: true,
    };
    let params = BackendParams::default();

    let basis_file = encode(&frontend, &[desc], &params).unwrap();
    let sections = encode_sections(&frontend, &[desc], &params).unwrap();
    let ktx2_file = wrap_ktx2(&sections, 32, 32);

    tessera_transcoder::init();

    let decode = |file: &[u8]| {
        let mut transcoder = Transcoder::new();
        transcoder.start_transcoding(file).unwrap();
        let mut state = TranscoderState::new();
        let mut out = vec![0u8; 64 * 16 * 4];
        transcoder
            .transcode_image_level(
                &mut state,
                file,
                0,
                0,
                &mut out,
                64 * 16,
                TextureFormat::Rgba32,
                DecodeFlags::empty(),
                0,
                0,
            )
            .unwrap();
        out
    };

    assert_eq!(decode(&basis_file), decode(&ktx2_file));

    let transcoder = Transcoder::new();
    let info = transcoder.get_file_info(&ktx2_file).unwrap();
    assert_eq!(info.total_images, 1);
    assert_eq!(info.tex_type, TextureType::TwoD);
    assert_eq!(info.total_endpoints, 8);
    assert_eq!(info.total_selectors, 8);
}
