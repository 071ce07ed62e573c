//! 模糊文本相似度
//!
//! `ratio` 为归一化 indel 相似度 `2 * LCS / (|a| + |b|)`，`partial_ratio` 把较短的
//! 串放到较长串的每个窗口上对齐（包括两端只部分重叠的窗口），取最高分。
//! 结果都缩放到 0..=100 的整数。LCS 用位并行算法（Hyyrö）计算，
//! 较长的课件文本也能在毫秒级完成。

use std::collections::HashMap;

/// 0..=100
pub type SimilarityScore = u8;

/// 整串相似度
pub fn ratio(a: &str, b: &str) -> SimilarityScore {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (pattern, text) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let masks = PatternMasks::new(pattern);
    to_score(normalized(masks.lcs(text), a.len(), b.len()))
}

/// 最佳子串对齐相似度
pub fn partial_ratio(a: &str, b: &str) -> SimilarityScore {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let m = short.len();
    let n = long.len();

    if long.windows(m).any(|w| w == short.as_slice()) {
        return 100;
    }

    let masks = PatternMasks::new(&short);
    let mut best = 0.0f64;

    // 窗口起点从 -(m-1) 到 n-1，两端的窗口被截短
    for start in -(m as isize - 1)..n as isize {
        let lo = start.max(0) as usize;
        let hi = ((start + m as isize) as usize).min(n);
        if lo >= hi {
            continue;
        }
        let window = &long[lo..hi];
        // 整窗首字符不在短串中时，右移一位的整窗得分不会更低
        if window.len() == m && hi < n && !masks.contains(window[0]) {
            continue;
        }

        let score = normalized(masks.lcs(window), m, window.len());
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }

    to_score(best)
}

fn normalized(lcs: usize, len_a: usize, len_b: usize) -> f64 {
    2.0 * lcs as f64 / (len_a + len_b) as f64
}

fn to_score(similarity: f64) -> SimilarityScore {
    (similarity * 100.0).round().clamp(0.0, 100.0) as SimilarityScore
}

/// 模式串的逐字符位掩码，多字（u64）表示
struct PatternMasks {
    len: usize,
    words: usize,
    masks: HashMap<char, Vec<u64>>,
}

impl PatternMasks {
    fn new(pattern: &[char]) -> Self {
        let len = pattern.len();
        let words = len.div_ceil(64).max(1);
        let mut masks: HashMap<char, Vec<u64>> = HashMap::new();
        for (i, &c) in pattern.iter().enumerate() {
            let entry = masks.entry(c).or_insert_with(|| vec![0u64; words]);
            entry[i / 64] |= 1u64 << (i % 64);
        }
        Self { len, words, masks }
    }

    fn contains(&self, c: char) -> bool {
        self.masks.contains_key(&c)
    }

    /// 模式串与 `text` 的最长公共子序列长度
    fn lcs(&self, text: &[char]) -> usize {
        let mut s = vec![!0u64; self.words];

        for c in text {
            let Some(m) = self.masks.get(c) else {
                continue;
            };
            let mut carry = 0u64;
            for (w, &mw) in s.iter_mut().zip(m.iter()) {
                let u = *w & mw;
                let (sum, c1) = w.overflowing_add(u);
                let (sum, c2) = sum.overflowing_add(carry);
                carry = (c1 || c2) as u64;
                *w = sum | (*w & !mw);
            }
        }

        let mut zeros = 0usize;
        for (i, w) in s.iter().enumerate() {
            let bits = (self.len - i * 64).min(64);
            let valid = if bits == 64 { !0u64 } else { (1u64 << bits) - 1 };
            zeros += (!w & valid).count_ones() as usize;
        }
        zeros
    }
}
