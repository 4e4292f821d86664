use lazy_static::lazy_static;

/// IUPAC pairs, upper case. Lower case is derived.
const IUPAC_PAIRS: &[(u8, u8)] = &[
    (b'A', b'T'),
    (b'C', b'G'),
    (b'R', b'Y'),
    (b'K', b'M'),
    (b'B', b'V'),
    (b'D', b'H'),
];

lazy_static! {
    /// Byte-indexed complement table. Bases without a partner (N, S, W, '.', '-', ...)
    /// map to themselves, so complementing twice is always the identity.
    static ref COMPLEMENT: [u8; 256] = {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for &(a, b) in IUPAC_PAIRS {
            table[a as usize] = b;
            table[b as usize] = a;
            table[a.to_ascii_lowercase() as usize] = b.to_ascii_lowercase();
            table[b.to_ascii_lowercase() as usize] = a.to_ascii_lowercase();
        }
        table
    };
}

/// Complement of a single base, preserving case.
pub fn complement(base: u8) -> u8 {
    COMPLEMENT[base as usize]
}

/// Reverse complement of a nucleotide sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// A run of `length` copies of `symbol`, used for N padding and its qualities.
pub fn padding_run(symbol: u8, length: usize) -> Vec<u8> {
    vec![symbol; length]
}
