use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Tokenizes a batch into `[B, max_len]` id and mask tensors.
///
/// Every row is padded or truncated to exactly `max_len` tokens, so a text
/// produces the same inputs whatever else shares its batch. Truncated rows
/// keep their final special token.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut all_ids = Vec::with_capacity(texts.len() * max_len);
    let mut all_mask = Vec::with_capacity(texts.len() * max_len);
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let (ids, mask) = fit_to_length(enc.get_ids(), enc.get_attention_mask(), max_len, pad_id);
        all_ids.extend(ids);
        all_mask.extend(mask);
    }
    let input_ids = Tensor::from_vec(all_ids, (texts.len(), max_len), device)?;
    let attention_mask = Tensor::from_vec(all_mask, (texts.len(), max_len), device)?;
    Ok((input_ids, attention_mask))
}

pub fn fit_to_length(ids: &[u32], mask: &[u32], max_len: usize, pad_id: u32) -> (Vec<u32>, Vec<u32>) {
    let mut ids = ids.to_vec();
    let mut mask = mask.to_vec();
    if ids.len() > max_len {
        let last = ids[ids.len() - 1];
        ids.truncate(max_len);
        mask.truncate(max_len);
        if let Some(slot) = ids.last_mut() { *slot = last; }
    }
    if ids.len() < max_len {
        let pad = max_len - ids.len();
        ids.extend(std::iter::repeat(pad_id).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
    }
    (ids, mask)
}

#[cfg(test)]
mod tests {
    use super::fit_to_length;

    #[test]
    fn truncation_keeps_final_special_token() {
        let (ids, mask) = fit_to_length(&[101, 5, 6, 7, 102], &[1, 1, 1, 1, 1], 3, 0);
        assert_eq!(ids, vec![101, 5, 102]);
        assert_eq!(mask, vec![1, 1, 1]);
    }

    #[test]
    fn short_input_is_padded_with_masked_pad_ids() {
        let (ids, mask) = fit_to_length(&[101, 9, 102], &[1, 1, 1], 5, 0);
        assert_eq!(ids, vec![101, 9, 102, 0, 0]);
        assert_eq!(mask, vec![1, 1, 1, 0, 0]);
    }
}
