//! Canonical Huffman coding.
//!
//! The decoding side uses a direct-mapped lookup for codes up to
//! [`HUFFMAN_FAST_BITS`] bits and a sign-encoded spill tree for longer
//! codes. The encoding side builds length-limited canonical codes from
//! symbol histograms and serializes tables with run-length and repeat
//! coding over the code-length alphabet.

use crate::{BitWriter, Error, Result};

/// Bit width of the serialized symbol count.
pub const HUFFMAN_MAX_SYMS_LOG2: u32 = 14;
/// Maximum number of symbols in one table.
pub const HUFFMAN_MAX_SYMS: usize = (1 << HUFFMAN_MAX_SYMS_LOG2) - 1;
/// Longest code length the wire format can describe.
pub const HUFFMAN_MAX_CODE_SIZE: u32 = 16;
/// Longest code length the decoder tolerates internally.
const HUFFMAN_MAX_INTERNAL_CODE_SIZE: u32 = 31;
/// Width of the direct-mapped decode lookup.
pub const HUFFMAN_FAST_BITS: u32 = 10;
/// Size of the code-length code alphabet (lengths 0-16 plus four
/// run/repeat meta-symbols).
pub const HUFFMAN_CODELENGTH_CODES: usize = 21;

const SMALL_ZERO_RUN: u32 = 17;
const BIG_ZERO_RUN: u32 = 18;
const SMALL_REPEAT: u32 = 19;
const BIG_REPEAT: u32 = 20;

/// Transmission order of the code-length code sizes. Meta-symbols first,
/// then raw lengths interleaved from the most common outward.
pub const HUFFMAN_CODELENGTH_ORDER: [u8; HUFFMAN_CODELENGTH_CODES] = [
    17, 18, 19, 20, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15, 16,
];

/// A canonical Huffman table prepared for decoding.
#[derive(Debug, PartialEq)]
pub struct DecodingTable {
    code_sizes: Vec<u8>,
    lookup: Vec<i32>,
    tree: Vec<i16>,
}

impl DecodingTable {
    pub fn empty() -> Self {
        Self {
            code_sizes: Vec::new(),
            lookup: Vec::new(),
            tree: Vec::new(),
        }
    }

    /// Builds the fast lookup and spill tree from per-symbol code sizes.
    ///
    /// Fails with `InvalidHuffman` if the sizes do not form a prefix code.
    /// The only valid single-symbol code has length 1.
    pub fn new(code_sizes: &[u8]) -> Result<Self> {
        if code_sizes.is_empty() {
            return Ok(Self::empty());
        }

        let total_syms = code_sizes.len();
        let fast_lookup_size = 1usize << HUFFMAN_FAST_BITS;

        let mut lookup = vec![0i32; fast_lookup_size];
        let mut tree = vec![0i16; total_syms * 2];

        let mut syms_using_codesize = [0u32; HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize + 1];
        for &size in code_sizes {
            if u32::from(size) > HUFFMAN_MAX_INTERNAL_CODE_SIZE {
                return Err(Error::InvalidHuffman);
            }
            syms_using_codesize[size as usize] += 1;
        }

        let mut next_code = [0u32; HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize + 1];
        let mut used_syms = 0u32;
        let mut total = 0u32;
        for i in 1..HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize {
            used_syms += syms_using_codesize[i];
            // Over-subscribed codes wrap; the completeness check below
            // rejects them.
            total = total.wrapping_add(syms_using_codesize[i]).wrapping_shl(1);
            next_code[i + 1] = total;
        }

        if total != 1 << HUFFMAN_MAX_INTERNAL_CODE_SIZE && used_syms != 1 {
            return Err(Error::InvalidHuffman);
        }

        let mut tree_next: i32 = -1;
        for (sym_index, &size) in code_sizes.iter().enumerate() {
            let code_size = u32::from(size);
            if code_size == 0 {
                continue;
            }

            let mut cur_code = next_code[code_size as usize];
            next_code[code_size as usize] += 1;

            let mut rev_code = 0u32;
            for _ in 0..code_size {
                rev_code = (rev_code << 1) | (cur_code & 1);
                cur_code >>= 1;
            }

            if code_size <= HUFFMAN_FAST_BITS {
                let k = ((code_size << 16) | sym_index as u32) as i32;
                let mut slot = rev_code as usize;
                while slot < fast_lookup_size {
                    if lookup[slot] != 0 {
                        return Err(Error::InvalidHuffman);
                    }
                    lookup[slot] = k;
                    slot += 1 << code_size;
                }
                continue;
            }

            let mut tree_cur = lookup[rev_code as usize & (fast_lookup_size - 1)];
            if tree_cur == 0 {
                lookup[rev_code as usize & (fast_lookup_size - 1)] = tree_next;
                tree_cur = tree_next;
                tree_next -= 2;
            }
            if tree_cur >= 0 {
                return Err(Error::InvalidHuffman);
            }

            let mut rev_code = rev_code >> (HUFFMAN_FAST_BITS - 1);

            for _ in ((HUFFMAN_FAST_BITS + 2)..=code_size).rev() {
                rev_code >>= 1;
                tree_cur -= (rev_code & 1) as i32;

                let idx = (-tree_cur - 1) as usize;
                if idx >= tree.len() {
                    tree.resize(idx + 1, 0);
                }
                if tree[idx] == 0 {
                    tree[idx] = tree_next as i16;
                    tree_cur = tree_next;
                    tree_next -= 2;
                } else {
                    tree_cur = i32::from(tree[idx]);
                    if tree_cur >= 0 {
                        return Err(Error::InvalidHuffman);
                    }
                }
            }

            rev_code >>= 1;
            tree_cur -= (rev_code & 1) as i32;

            let idx = (-tree_cur - 1) as usize;
            if idx >= tree.len() {
                tree.resize(idx + 1, 0);
            }
            if tree[idx] != 0 {
                return Err(Error::InvalidHuffman);
            }
            tree[idx] = sym_index as i16;
        }

        Ok(Self {
            code_sizes: code_sizes.to_vec(),
            lookup,
            tree,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.code_sizes.is_empty()
    }

    pub fn total_syms(&self) -> usize {
        self.code_sizes.len()
    }

    pub fn code_sizes(&self) -> &[u8] {
        &self.code_sizes
    }

    pub(crate) fn lookup(&self, index: usize) -> i32 {
        self.lookup[index]
    }

    pub(crate) fn tree(&self, index: usize) -> i16 {
        self.tree.get(index).copied().unwrap_or(0)
    }
}

/// A canonical Huffman table prepared for encoding: per-symbol bit-reversed
/// codes ready for the LSB-first writer.
pub struct EncodingTable {
    code_sizes: Vec<u8>,
    codes: Vec<u16>,
}

impl EncodingTable {
    /// Builds a length-limited canonical code from a symbol histogram.
    ///
    /// Symbols with zero frequency get no code. Ties are broken toward the
    /// lower symbol index so table construction is deterministic.
    pub fn from_histogram(freqs: &[u32], max_code_size: u32) -> Result<Self> {
        debug_assert!(max_code_size >= 1 && max_code_size <= HUFFMAN_MAX_CODE_SIZE);
        if freqs.is_empty() || freqs.len() > HUFFMAN_MAX_SYMS {
            return Err(Error::InvalidCodeLengths);
        }

        let mut used: Vec<(u32, usize)> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f > 0)
            .map(|(i, &f)| (f, i))
            .collect();
        if used.is_empty() {
            return Err(Error::InvalidCodeLengths);
        }

        let mut code_sizes = vec![0u8; freqs.len()];

        if used.len() == 1 {
            code_sizes[used[0].1] = 1;
            return Self::from_code_sizes(code_sizes);
        }

        used.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut a: Vec<u64> = used.iter().map(|&(f, _)| u64::from(f)).collect();
        minimum_redundancy(&mut a);

        let mut num_codes = [0u32; HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize + 1];
        for &len in &a {
            let len = (len as u32).min(HUFFMAN_MAX_INTERNAL_CODE_SIZE);
            num_codes[len as usize] += 1;
        }

        enforce_max_code_size(&mut num_codes, max_code_size);

        // Most frequent symbols take the shortest lengths; within one
        // length, assignment order is by ascending symbol index via the
        // canonical code construction below.
        let mut sizes_in_order = Vec::with_capacity(used.len());
        for len in 1..=max_code_size {
            for _ in 0..num_codes[len as usize] {
                sizes_in_order.push(len as u8);
            }
        }
        debug_assert_eq!(sizes_in_order.len(), used.len());

        used.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (&(_, sym), &size) in used.iter().zip(&sizes_in_order) {
            code_sizes[sym] = size;
        }

        Self::from_code_sizes(code_sizes)
    }

    /// Assigns canonical codes (bit-reversed for the LSB-first writer) to a
    /// fixed set of code sizes. The construction mirrors
    /// [`DecodingTable::new`] exactly.
    pub fn from_code_sizes(code_sizes: Vec<u8>) -> Result<Self> {
        let mut syms_using_codesize = [0u32; HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize + 1];
        for &size in &code_sizes {
            if u32::from(size) > HUFFMAN_MAX_CODE_SIZE {
                return Err(Error::InvalidCodeLengths);
            }
            syms_using_codesize[size as usize] += 1;
        }

        let mut next_code = [0u32; HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize + 1];
        let mut total = 0u32;
        for i in 1..HUFFMAN_MAX_INTERNAL_CODE_SIZE as usize {
            total = total.wrapping_add(syms_using_codesize[i]).wrapping_shl(1);
            next_code[i + 1] = total;
        }

        let mut codes = vec![0u16; code_sizes.len()];
        for (sym, &size) in code_sizes.iter().enumerate() {
            let code_size = u32::from(size);
            if code_size == 0 {
                continue;
            }

            let mut cur_code = next_code[code_size as usize];
            next_code[code_size as usize] += 1;

            let mut rev_code = 0u32;
            for _ in 0..code_size {
                rev_code = (rev_code << 1) | (cur_code & 1);
                cur_code >>= 1;
            }
            codes[sym] = rev_code as u16;
        }

        Ok(Self { code_sizes, codes })
    }

    pub fn code(&self, sym: usize) -> (u32, u8) {
        (u32::from(self.codes[sym]), self.code_sizes[sym])
    }

    pub fn code_sizes(&self) -> &[u8] {
        &self.code_sizes
    }

    /// Serializes the table: 14-bit symbol count, then the code-length code
    /// sizes (5-bit count, 3 bits each in [`HUFFMAN_CODELENGTH_ORDER`]),
    /// then the run/repeat-coded symbol code lengths. Returns the number of
    /// bits written.
    pub fn serialize(&self, writer: &mut BitWriter) -> Result<u32> {
        let mut bits = writer.put_bits(self.code_sizes.len() as u32, HUFFMAN_MAX_SYMS_LOG2);
        if self.code_sizes.is_empty() {
            return Ok(bits);
        }

        // Meta-symbol stream: (symbol, extra-bit count, extra value).
        let mut meta: Vec<(u32, u32, u32)> = Vec::new();
        let mut i = 0;
        while i < self.code_sizes.len() {
            let size = self.code_sizes[i];

            let mut run = 1;
            while i + run < self.code_sizes.len() && self.code_sizes[i + run] == size {
                run += 1;
            }
            i += run;

            if size == 0 {
                loop {
                    if run >= 11 {
                        let n = run.min(11 + 127);
                        meta.push((BIG_ZERO_RUN, 7, (n - 11) as u32));
                        run -= n;
                    } else if run >= 3 {
                        meta.push((SMALL_ZERO_RUN, 3, (run - 3) as u32));
                        run = 0;
                    } else {
                        for _ in 0..run {
                            meta.push((0, 0, 0));
                        }
                        run = 0;
                    }
                    if run == 0 {
                        break;
                    }
                }
            } else {
                meta.push((u32::from(size), 0, 0));
                run -= 1;
                while run > 0 {
                    if run >= 7 {
                        let n = run.min(7 + 127);
                        meta.push((BIG_REPEAT, 7, (n - 7) as u32));
                        run -= n;
                    } else if run >= 3 {
                        meta.push((SMALL_REPEAT, 2, (run - 3) as u32));
                        run = 0;
                    } else {
                        for _ in 0..run {
                            meta.push((u32::from(size), 0, 0));
                        }
                        run = 0;
                    }
                }
            }
        }

        let mut codelength_hist = [0u32; HUFFMAN_CODELENGTH_CODES];
        for &(sym, _, _) in &meta {
            codelength_hist[sym as usize] += 1;
        }
        // 3-bit serialized sizes cap the code-length code at 7 bits.
        let codelength_table = EncodingTable::from_histogram(&codelength_hist, 7)?;

        let mut num_codelength_codes = HUFFMAN_CODELENGTH_CODES;
        while num_codelength_codes > 1
            && codelength_table.code_sizes[HUFFMAN_CODELENGTH_ORDER[num_codelength_codes - 1] as usize]
                == 0
        {
            num_codelength_codes -= 1;
        }

        bits += writer.put_bits(num_codelength_codes as u32, 5);
        for i in 0..num_codelength_codes {
            bits += writer.put_bits(
                u32::from(codelength_table.code_sizes[HUFFMAN_CODELENGTH_ORDER[i] as usize]),
                3,
            );
        }

        for &(sym, extra_bits, extra) in &meta {
            bits += writer.put_huffman(sym, &codelength_table);
            if extra_bits > 0 {
                bits += writer.put_bits(extra, extra_bits);
            }
        }

        Ok(bits)
    }
}

/// Moffat & Katajainen in-place minimum-redundancy code lengths.
/// `a` holds frequencies sorted ascending on entry, code lengths on exit.
fn minimum_redundancy(a: &mut [u64]) {
    let n = a.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        a[0] = 1;
        return;
    }

    a[0] += a[1];
    let mut root = 0usize;
    let mut leaf = 2usize;
    for next in 1..n - 1 {
        if leaf >= n || a[root] < a[leaf] {
            a[next] = a[root];
            a[root] = next as u64;
            root += 1;
        } else {
            a[next] = a[leaf];
            leaf += 1;
        }

        if leaf >= n || (root < next && a[root] < a[leaf]) {
            a[next] += a[root];
            a[root] = next as u64;
            root += 1;
        } else {
            a[next] += a[leaf];
            leaf += 1;
        }
    }

    a[n - 2] = 0;
    for next in (0..n.saturating_sub(2)).rev() {
        a[next] = a[a[next] as usize] + 1;
    }

    let mut avail = 1isize;
    let mut used = 0isize;
    let mut depth = 0u64;
    let mut root = n as isize - 2;
    let mut next = n as isize - 1;
    while avail > 0 {
        while root >= 0 && a[root as usize] == depth {
            used += 1;
            root -= 1;
        }
        while avail > used {
            a[next as usize] = depth;
            next -= 1;
            avail -= 1;
        }
        avail = 2 * used;
        depth += 1;
        used = 0;
    }
}

/// Clamps code lengths to `max_code_size`, then repairs the Kraft sum by
/// promoting nodes until the code is exactly full.
fn enforce_max_code_size(num_codes: &mut [u32], max_code_size: u32) {
    let max = max_code_size as usize;

    let mut over = 0u32;
    for len in max + 1..num_codes.len() {
        over += num_codes[len];
        num_codes[len] = 0;
    }
    num_codes[max] += over;

    let mut total = 0u64;
    for len in (1..=max).rev() {
        total += u64::from(num_codes[len]) << (max - len);
    }

    while total != 1 << max {
        if num_codes[max] == 0 {
            break;
        }
        num_codes[max] -= 1;
        for len in (1..max).rev() {
            if num_codes[len] > 0 {
                num_codes[len] -= 1;
                num_codes[len + 1] += 2;
                break;
            }
        }
        total -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BitReader, Lcg};

    fn round_trip(freqs: &[u32], max_code_size: u32) {
        let enc = EncodingTable::from_histogram(freqs, max_code_size).unwrap();

        let mut writer = BitWriter::new();
        enc.serialize(&mut writer).unwrap();

        let syms: Vec<u32> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f > 0)
            .map(|(i, _)| i as u32)
            .collect();
        for &s in &syms {
            writer.put_huffman(s, &enc);
        }
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let dec = reader.read_huffman_table().unwrap();
        assert_eq!(dec.code_sizes(), enc.code_sizes());
        for &s in &syms {
            assert_eq!(reader.get_huffman(&dec), s);
        }
    }

    #[test]
    fn single_symbol_table() {
        round_trip(&[0, 7, 0, 0], 16);
    }

    #[test]
    fn small_tables() {
        round_trip(&[1, 1], 16);
        round_trip(&[1, 2, 4, 8, 16, 32], 16);
        round_trip(&[5, 0, 0, 5, 1, 0, 9], 16);
    }

    #[test]
    fn skewed_table_respects_length_limit() {
        let mut freqs = vec![0u32; 40];
        let mut f = 1u32;
        for slot in freqs.iter_mut() {
            *slot = f;
            f = f.saturating_mul(2);
        }
        let enc = EncodingTable::from_histogram(&freqs, 10).unwrap();
        assert!(enc.code_sizes().iter().all(|&s| s <= 10));

        // Kraft equality: the repaired code must still be complete.
        let kraft: u64 = enc
            .code_sizes()
            .iter()
            .filter(|&&s| s > 0)
            .map(|&s| 1u64 << (10 - u32::from(s)))
            .sum();
        assert_eq!(kraft, 1 << 10);

        round_trip(&freqs, 10);
    }

    #[test]
    fn long_codes_use_spill_tree() {
        // Force many distinct lengths so some codes exceed the fast bits.
        let mut freqs = vec![0u32; 600];
        let mut lcg = Lcg::new(99);
        for slot in freqs.iter_mut() {
            *slot = 1 + lcg.next_below(64);
        }
        round_trip(&freqs, 16);
    }

    #[test]
    fn large_sparse_alphabet() {
        let mut freqs = vec![0u32; 4000];
        let mut lcg = Lcg::new(7);
        for _ in 0..200 {
            let i = lcg.next_below(4000) as usize;
            freqs[i] = 1 + lcg.next_below(1000);
        }
        let used = freqs.iter().filter(|&&f| f > 0).count();
        assert!(used > 2);
        round_trip(&freqs, 16);
    }

    #[test]
    fn prefix_violation_rejected() {
        // Two symbols cannot both have one-bit codes alongside a third.
        assert!(DecodingTable::new(&[1, 1, 1]).is_err());
        // Incomplete code.
        assert!(DecodingTable::new(&[2, 2]).is_err());
    }

    #[test]
    fn repeat_without_previous_rejected() {
        // Hand-build a stream whose first code-length symbol is a repeat.
        let mut hist = [0u32; HUFFMAN_CODELENGTH_CODES];
        hist[SMALL_REPEAT as usize] = 1;
        hist[8] = 1;
        let cl = EncodingTable::from_histogram(&hist, 7).unwrap();

        let mut writer = BitWriter::new();
        writer.put_bits(4, HUFFMAN_MAX_SYMS_LOG2);
        let mut num = HUFFMAN_CODELENGTH_CODES;
        while num > 1 && cl.code_sizes()[HUFFMAN_CODELENGTH_ORDER[num - 1] as usize] == 0 {
            num -= 1;
        }
        writer.put_bits(num as u32, 5);
        for i in 0..num {
            writer.put_bits(u32::from(cl.code_sizes()[HUFFMAN_CODELENGTH_ORDER[i] as usize]), 3);
        }
        writer.put_huffman(SMALL_REPEAT, &cl);
        writer.put_bits(0, 2);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_huffman_table(), Err(Error::InvalidHuffman));
    }
}
