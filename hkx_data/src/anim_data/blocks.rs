//! The predictive block codec.
//!
//! Animation samples are quantized to 14 bit signed integers and compressed in
//! tiles of 16 channels by 16 frames. Each channel is delta transformed three
//! times and split into two 8 frame segments. Segments pack sample pairs with
//! a shared minimal bit width, and consecutive blocks in a clip overlap by one
//! frame so the delta prediction can restart from a known sample.

use bitvec::prelude::*;
use log::warn;
use modular_bitfield::prelude::*;
use thiserror::Error;

use super::bitutils::{sign_extend, BitWindow, BitWriter};

pub const BLOCK_CHANNELS: usize = 16;
pub const BLOCK_FRAMES: usize = 16;

/// Samples are coded as 14 bit two's complement.
pub const MIN_SAMPLE: i16 = -(1 << 13);
pub const MAX_SAMPLE: i16 = (1 << 13) - 1;

/// 16 header bytes plus 16 bytes per channel per segment at the widest packing.
pub const MAX_COMPRESSED_BLOCK_SIZE: usize = 272;

const DELTA_PASSES: usize = 3;
const SEGMENT_FRAMES: usize = 8;

/// Errors while encoding or decoding compressed sample blocks.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("frame count {frame_count} is outside the range 1..=16")]
    FrameCountOutOfRange { frame_count: usize },

    #[error("channel count {channel_count} is outside the range 1..=16")]
    ChannelCountOutOfRange { channel_count: usize },

    #[error("compressed data of length {len} is too short for a block at offset {offset}")]
    DataTooShort { len: usize, offset: usize },

    /// The bytes consumed by a block row disagree with the block offset table.
    #[error("block {block} ended at byte {actual} but the offset table expects {expected}")]
    BlockOffsetMismatch {
        block: usize,
        expected: usize,
        actual: usize,
    },
}

/// Controls how multi block stitching treats an offset table entry that
/// disagrees with the bytes actually consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchMode {
    /// Fail with [BlockError::BlockOffsetMismatch].
    Strict,
    /// Log a warning and trust the per channel header walk.
    Lenient,
}

/// A 16 channel by 16 frame tile of signed samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBlock {
    /// Indexed by `[channel][frame]`.
    pub samples: [[i16; BLOCK_FRAMES]; BLOCK_CHANNELS],
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self {
            samples: [[0; BLOCK_FRAMES]; BLOCK_CHANNELS],
        }
    }
}

impl SampleBlock {
    pub fn new() -> Self {
        Self::default()
    }
}

// One header byte per channel. The stored nibbles are segment byte lengths
// minus one, so lengths cover 1..=16.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSizes {
    pub second_segment: B4,
    pub first_segment: B4,
}

impl ChannelSizes {
    fn from_lengths(first: usize, second: usize) -> Self {
        ChannelSizes::new()
            .with_first_segment((first - 1) as u8)
            .with_second_segment((second - 1) as u8)
    }

    fn lengths(byte: u8) -> (usize, usize) {
        let sizes = ChannelSizes::from_bytes([byte]);
        (
            sizes.first_segment() as usize + 1,
            sizes.second_segment() as usize + 1,
        )
    }

    fn to_byte(self) -> u8 {
        self.into_bytes()[0]
    }
}

fn check_counts(frame_count: usize, channel_count: usize) -> Result<(), BlockError> {
    if frame_count < 1 || frame_count > BLOCK_FRAMES {
        return Err(BlockError::FrameCountOutOfRange { frame_count });
    }
    if channel_count < 1 || channel_count > BLOCK_CHANNELS {
        return Err(BlockError::ChannelCountOutOfRange { channel_count });
    }
    Ok(())
}

/// Encodes a block of animation samples.
///
/// Only the first `channel_count` channels are coded. Channels past the count
/// still occupy a header byte and two placeholder segments so the block shape
/// stays fixed.
pub fn encode_block(
    block: &SampleBlock,
    frame_count: usize,
    channel_count: usize,
) -> Result<Vec<u8>, BlockError> {
    check_counts(frame_count, channel_count)?;

    let mut channels = block.samples;
    for channel in channels.iter_mut().take(channel_count) {
        delta_encode(channel);
    }

    let mut output = Vec::with_capacity(MAX_COMPRESSED_BLOCK_SIZE);
    output.extend_from_slice(&[0u8; BLOCK_CHANNELS]);

    let mut sizes = [0u8; BLOCK_CHANNELS];
    for (channel, samples) in channels.iter().enumerate().take(channel_count) {
        sizes[channel] = encode_channel(samples, frame_count, &mut output);
    }

    // Placeholder channels: a single zero byte for each segment.
    for size in sizes.iter_mut().skip(channel_count) {
        *size = ChannelSizes::from_lengths(1, 1).to_byte();
        output.push(0);
        output.push(0);
    }

    output[..BLOCK_CHANNELS].copy_from_slice(&sizes);
    Ok(output)
}

// The delta transform operates on samples shifted up by two so that repeated
// differences wrap in 16 bits exactly like the original runtime.
fn delta_encode(samples: &mut [i16; BLOCK_FRAMES]) {
    for sample in samples.iter_mut() {
        *sample = sample.wrapping_shl(2);
    }

    for _ in 0..DELTA_PASSES {
        for i in (1..BLOCK_FRAMES).rev() {
            samples[i] = samples[i].wrapping_sub(samples[i - 1]);
        }
    }

    for sample in samples.iter_mut() {
        *sample >>= 2;
    }
}

fn encode_channel(samples: &[i16; BLOCK_FRAMES], frame_count: usize, output: &mut Vec<u8>) -> u8 {
    let first = encode_segment(samples, 0, frame_count.min(SEGMENT_FRAMES), output);

    let second = if frame_count > SEGMENT_FRAMES {
        encode_segment(samples, SEGMENT_FRAMES, frame_count - SEGMENT_FRAMES, output)
    } else {
        output.push(0);
        1
    };

    ChannelSizes::from_lengths(first, second).to_byte()
}

// Packs up to 8 delta samples as 4 pairs of (4 bit width, two width bit
// values), little endian first, then reverses the bytes so the segment is
// stored most significant first. Returns the segment's byte length.
fn encode_segment(
    samples: &[i16; BLOCK_FRAMES],
    offset: usize,
    count: usize,
    output: &mut Vec<u8>,
) -> usize {
    let mut bits = BitVec::<u8, Lsb0>::new();
    bits.resize(128, false);
    let mut writer = BitWriter::new(bits);

    // An odd final sample is paired with the next raw sample, or zero past
    // the end of the block.
    let pair_count = (count + 1) / 2;
    for pair in 0..pair_count {
        let index = offset + pair * 2;
        let first = samples[index];
        let second = if index + 1 < BLOCK_FRAMES {
            samples[index + 1]
        } else {
            0
        };

        let width = find_width(first, second);
        writer.write(width as u32, 4);
        writer.write(first as u16 as u32 & bit_mask(width), width);
        writer.write(second as u16 as u32 & bit_mask(width), width);
    }

    let byte_count = (writer.bits_written() + 7) / 8;
    let bytes = writer.into_bytes();
    output.extend(bytes[..byte_count].iter().rev());
    byte_count
}

/// Returns the minimal width in 0..=14 so that both values fit in width bit
/// two's complement. A width of zero means both values are zero.
pub fn find_width(first: i16, second: i16) -> usize {
    (0..=14)
        .find(|&width| fits_in(first, width) && fits_in(second, width))
        .unwrap_or(14)
}

fn fits_in(value: i16, bit_len: usize) -> bool {
    if bit_len == 0 {
        return value == 0;
    }
    let shifted = (value as i32) >> (bit_len - 1);
    shifted == 0 || shifted == -1
}

fn bit_mask(bits: usize) -> u32 {
    if bits == 0 {
        0
    } else {
        (1u32 << bits) - 1
    }
}

/// Decodes one compressed block starting at `start_offset`.
///
/// Returns the decoded block and the end position of the consumed bytes.
/// Only the first `frame_count` samples of each of the first `channel_count`
/// channels are reconstructed.
pub fn decode_block(
    data: &[u8],
    start_offset: usize,
    channel_count: usize,
    frame_count: usize,
) -> Result<(SampleBlock, usize), BlockError> {
    check_counts(frame_count, channel_count)?;

    if start_offset + BLOCK_CHANNELS > data.len() {
        return Err(BlockError::DataTooShort {
            len: data.len(),
            offset: start_offset,
        });
    }

    let mut block = SampleBlock::new();
    let mut position = start_offset + BLOCK_CHANNELS;

    for channel in 0..channel_count {
        let (first, second) = ChannelSizes::lengths(data[start_offset + channel]);

        decode_segment(data, position + first, &mut block.samples[channel], 0);
        position += first;

        decode_segment(data, position + second, &mut block.samples[channel], SEGMENT_FRAMES);
        position += second;

        delta_decode(&mut block.samples[channel], frame_count);
    }

    Ok((block, position))
}

// Decodes 8 samples from the bit window ending at `end`. The decoded deltas
// stay shifted up by two until the cumulative sums run.
fn decode_segment(data: &[u8], end: usize, samples: &mut [i16; BLOCK_FRAMES], offset: usize) {
    let mut window = BitWindow::load(data, end);

    let mut index = offset;
    for _ in 0..SEGMENT_FRAMES / 2 {
        let width = window.take(4) as usize;

        let first = sign_extend(window.take(width), width);
        samples[index] = (first as i16).wrapping_shl(2);
        index += 1;

        let second = sign_extend(window.take(width), width);
        samples[index] = (second as i16).wrapping_shl(2);
        index += 1;
    }
}

fn delta_decode(samples: &mut [i16; BLOCK_FRAMES], frame_count: usize) {
    for _ in 0..DELTA_PASSES {
        let mut sum = 0i16;
        for sample in samples.iter_mut().take(frame_count) {
            sum = sum.wrapping_add(*sample);
            *sample = sum;
        }
    }

    for sample in samples.iter_mut().take(frame_count) {
        *sample >>= 2;
    }
}

/// Decodes every frame of every channel from a sequence of blocks.
///
/// `block_offsets` holds 32 bit block end offsets as paired 16 bit words
/// (low, high) with an implicit leading zero. Block `k` covers compressed
/// frames starting at `k * 15`, overlapping its predecessor by one frame;
/// the overlap frame is dropped from every block after the first. Channels
/// are coded 16 at a time within each block row.
pub fn decode_frame_channels(
    data: &[u8],
    block_offsets: &[u16],
    channel_count: usize,
    frame_count: usize,
    mode: StitchMode,
) -> Result<Vec<Vec<i16>>, BlockError> {
    let mut channel_frames = vec![vec![0i16; frame_count]; channel_count];
    if channel_count == 0 {
        return Ok(channel_frames);
    }

    let mut offsets = Vec::with_capacity(block_offsets.len() / 2 + 1);
    offsets.push(0usize);
    for pair in block_offsets.chunks_exact(2) {
        offsets.push(((pair[1] as usize) << 16) | pair[0] as usize);
    }

    let mut output_frame = 0;
    for (row, bounds) in offsets.windows(2).enumerate() {
        let mut position = bounds[0];

        let start_frame = row * (BLOCK_FRAMES - 1);
        let frames = BLOCK_FRAMES.min(frame_count.saturating_sub(start_frame));

        // Blocks after the first repeat the previous block's final frame.
        let skip = usize::from(row > 0);

        let mut fetched = 0;
        while fetched < channel_count {
            let channels = BLOCK_CHANNELS.min(channel_count - fetched);
            let (block, end) = decode_block(data, position, channels, frames)?;
            position = end;

            for channel in 0..channels {
                for frame in skip..frames {
                    channel_frames[fetched + channel][output_frame + frame - skip] =
                        block.samples[channel][frame];
                }
            }

            fetched += channels;
        }

        if position != bounds[1] {
            match mode {
                StitchMode::Strict => {
                    return Err(BlockError::BlockOffsetMismatch {
                        block: row,
                        expected: bounds[1],
                        actual: position,
                    })
                }
                StitchMode::Lenient => warn!(
                    "block {} ended at byte {} but the offset table expects {}",
                    row, position, bounds[1]
                ),
            }
        }

        output_frame += frames - skip;
    }

    Ok(channel_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;

    fn test_block() -> SampleBlock {
        let mut block = SampleBlock::new();
        for frame in 0..BLOCK_FRAMES {
            // Linear, constant, quadratic, and extreme channels.
            block.samples[0][frame] = (1000 + frame as i16) * 2;
            block.samples[1][frame] = 500;
            block.samples[2][frame] = (frame * frame) as i16;
            block.samples[3][frame] = if frame % 2 == 0 { MIN_SAMPLE } else { MAX_SAMPLE };
        }
        block
    }

    #[test]
    fn encode_decode_full_block_round_trip() {
        let block = test_block();
        let compressed = encode_block(&block, BLOCK_FRAMES, BLOCK_CHANNELS).unwrap();
        assert!(compressed.len() <= MAX_COMPRESSED_BLOCK_SIZE);

        let (decoded, end) = decode_block(&compressed, 0, BLOCK_CHANNELS, BLOCK_FRAMES).unwrap();
        assert_eq!(block, decoded);
        assert_eq!(compressed.len(), end);
    }

    #[test]
    fn encode_constant_channel_bytes() {
        // A constant channel of 4 delta encodes to [4, -8, 4, 0, ...], so
        // segment 0 packs two width 4 pairs and two empty pairs.
        let mut block = SampleBlock::new();
        for frame in 0..BLOCK_FRAMES {
            block.samples[0][frame] = 4;
        }

        let compressed = encode_block(&block, BLOCK_FRAMES, 1).unwrap();
        let expected = hex!(
            // header: segment lengths 4 and 2, then placeholder channels
            31000000 00000000 00000000 00000000
            // channel 0 segments, stored most significant byte first
            00044844 0000
            // placeholder segments for channels 1-15
            00000000 00000000 00000000 00000000
            00000000 00000000 00000000 0000
        );
        assert_eq!(expected.to_vec(), compressed);

        let (decoded, _) = decode_block(&compressed, 0, 1, BLOCK_FRAMES).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn encode_decode_partial_block_round_trip() {
        let block = test_block();
        let compressed = encode_block(&block, 5, 3).unwrap();

        let (decoded, _) = decode_block(&compressed, 0, 3, 5).unwrap();
        for channel in 0..3 {
            assert_eq!(
                block.samples[channel][..5],
                decoded.samples[channel][..5],
                "channel {}",
                channel
            );
        }
    }

    #[test]
    fn encode_decode_at_offset() {
        let block = test_block();
        let compressed = encode_block(&block, BLOCK_FRAMES, BLOCK_CHANNELS).unwrap();

        let mut padded = vec![0xAAu8; 7];
        padded.extend_from_slice(&compressed);

        let (decoded, end) = decode_block(&padded, 7, BLOCK_CHANNELS, BLOCK_FRAMES).unwrap();
        assert_eq!(block, decoded);
        assert_eq!(padded.len(), end);
    }

    #[test]
    fn encode_frame_count_out_of_range() {
        let block = SampleBlock::new();
        assert!(matches!(
            encode_block(&block, 0, 16),
            Err(BlockError::FrameCountOutOfRange { frame_count: 0 })
        ));
        assert!(matches!(
            encode_block(&block, 17, 16),
            Err(BlockError::FrameCountOutOfRange { frame_count: 17 })
        ));
    }

    #[test]
    fn encode_channel_count_out_of_range() {
        let block = SampleBlock::new();
        assert!(matches!(
            encode_block(&block, 16, 0),
            Err(BlockError::ChannelCountOutOfRange { channel_count: 0 })
        ));
    }

    #[test]
    fn decode_data_too_short() {
        assert!(matches!(
            decode_block(&[0u8; 8], 0, 16, 16),
            Err(BlockError::DataTooShort { len: 8, offset: 0 })
        ));
    }

    #[test]
    fn find_width_minimal() {
        assert_eq!(0, find_width(0, 0));
        assert_eq!(1, find_width(-1, 0));
        assert_eq!(2, find_width(1, 0));
        assert_eq!(2, find_width(1, -2));
        assert_eq!(3, find_width(2, -2));
        assert_eq!(14, find_width(MAX_SAMPLE, 0));
        assert_eq!(14, find_width(MIN_SAMPLE, -1));
    }

    #[test]
    fn channel_sizes_round_trip() {
        for first in 1..=16 {
            for second in 1..=16 {
                let byte = ChannelSizes::from_lengths(first, second).to_byte();
                assert_eq!((first, second), ChannelSizes::lengths(byte));
            }
        }
    }

    #[test]
    fn channel_sizes_nibble_order() {
        // The first segment length occupies the high nibble.
        assert_eq!(0x31, ChannelSizes::from_lengths(4, 2).to_byte());
    }

    // Builds a two block clip of 16 channels and its offset table. Channel 0
    // carries `samples`, the rest stay zero. Block 1 restarts at compressed
    // frame 15.
    fn two_block_clip(samples: &[i16]) -> (Vec<u8>, Vec<u16>) {
        let total = samples.len();
        assert!(total > BLOCK_FRAMES && total <= 2 * BLOCK_FRAMES - 1);

        let mut first = SampleBlock::new();
        first.samples[0][..BLOCK_FRAMES].copy_from_slice(&samples[..BLOCK_FRAMES]);

        let second_frames = total - (BLOCK_FRAMES - 1);
        let mut second = SampleBlock::new();
        second.samples[0][..second_frames]
            .copy_from_slice(&samples[BLOCK_FRAMES - 1..]);

        let mut data = encode_block(&first, BLOCK_FRAMES, BLOCK_CHANNELS).unwrap();
        let first_end = data.len();
        data.extend(encode_block(&second, second_frames, BLOCK_CHANNELS).unwrap());

        let offsets = vec![
            first_end as u16,
            (first_end >> 16) as u16,
            data.len() as u16,
            (data.len() >> 16) as u16,
        ];
        (data, offsets)
    }

    #[test]
    fn stitch_two_blocks() {
        let samples: Vec<i16> = (0..31).map(|i| (i * i - 40 * i + 7) as i16).collect();
        let (data, offsets) = two_block_clip(&samples);

        let decoded = decode_frame_channels(
            &data,
            &offsets,
            BLOCK_CHANNELS,
            samples.len(),
            StitchMode::Strict,
        )
        .unwrap();
        assert_eq!(BLOCK_CHANNELS, decoded.len());
        assert_eq!(samples, decoded[0]);
        assert_eq!(vec![0i16; samples.len()], decoded[1]);
    }

    #[test]
    fn stitch_overlap_frame_matches() {
        let samples: Vec<i16> = (0..31).map(|i| (3 * i - 17) as i16).collect();
        let (data, offsets) = two_block_clip(&samples);

        let first_end = ((offsets[1] as usize) << 16) | offsets[0] as usize;
        let (first, _) = decode_block(&data, 0, 1, BLOCK_FRAMES).unwrap();
        let (second, _) = decode_block(&data, first_end, 1, BLOCK_FRAMES).unwrap();

        // The overlap frame is coded in both blocks before trimming.
        assert_eq!(first.samples[0][BLOCK_FRAMES - 1], second.samples[0][0]);
    }

    #[test]
    fn stitch_offset_mismatch_strict() {
        let samples: Vec<i16> = (0..31).map(|i| i as i16).collect();
        let (data, mut offsets) = two_block_clip(&samples);
        offsets[0] += 1;

        let result = decode_frame_channels(
            &data,
            &offsets,
            BLOCK_CHANNELS,
            samples.len(),
            StitchMode::Strict,
        );
        assert!(matches!(
            result,
            Err(BlockError::BlockOffsetMismatch { block: 0, .. })
        ));
    }

    #[test]
    fn stitch_offset_mismatch_lenient() {
        let samples: Vec<i16> = (0..31).map(|i| i as i16).collect();
        let (data, mut offsets) = two_block_clip(&samples);
        offsets[0] += 1;

        // The corrupted table entry also shifts where block 1 is read from,
        // so only the first block's samples are still reliable.
        let decoded = decode_frame_channels(
            &data,
            &offsets,
            BLOCK_CHANNELS,
            samples.len(),
            StitchMode::Lenient,
        )
        .unwrap();
        assert_eq!(samples[..BLOCK_FRAMES], decoded[0][..BLOCK_FRAMES]);
    }

    #[test]
    fn stitch_multiple_channel_groups() {
        // 18 channels split into a 16 channel block and a 2 channel block.
        // The trailing block keeps placeholder segments for its unused
        // channels, so the offset table points at the bytes the decoder
        // actually consumes.
        let mut first = SampleBlock::new();
        let mut second = SampleBlock::new();
        for channel in 0..BLOCK_CHANNELS {
            for frame in 0..4 {
                first.samples[channel][frame] = (channel * 10 + frame) as i16;
            }
        }
        for frame in 0..4 {
            second.samples[0][frame] = (200 + frame) as i16;
            second.samples[1][frame] = -(frame as i16);
        }

        let mut data = encode_block(&first, 4, BLOCK_CHANNELS).unwrap();
        let second_start = data.len();
        data.extend(encode_block(&second, 4, 2).unwrap());
        let (_, end) = decode_block(&data, second_start, 2, 4).unwrap();
        let offsets = vec![end as u16, (end >> 16) as u16];

        let decoded = decode_frame_channels(&data, &offsets, 18, 4, StitchMode::Strict).unwrap();
        assert_eq!(18, decoded.len());
        assert_eq!(vec![10, 11, 12, 13], decoded[1]);
        assert_eq!(vec![200, 201, 202, 203], decoded[16]);
        assert_eq!(vec![0, -1, -2, -3], decoded[17]);
    }
}
