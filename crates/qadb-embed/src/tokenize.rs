use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Tokenize a batch into `[B, max_len]` id and mask tensors.
///
/// Every row is truncated or padded to exactly `max_len`, so a text produces
/// the same row whatever batch it travels in.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, pad_id: u32, device: &Device) -> Result<(Tensor, Tensor)> {
    let mut ids_flat = Vec::with_capacity(texts.len() * max_len);
    let mut mask_flat = Vec::with_capacity(texts.len() * max_len);
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
        if ids.len() < max_len { let pad = max_len - ids.len(); ids.extend(std::iter::repeat(pad_id).take(pad)); mask.extend(std::iter::repeat(0).take(pad)); }
        ids_flat.extend(ids);
        mask_flat.extend(mask);
    }
    let input_ids = Tensor::from_vec(ids_flat, (texts.len(), max_len), device)?;
    let attention_mask = Tensor::from_vec(mask_flat, (texts.len(), max_len), device)?;
    Ok((input_ids, attention_mask))
}
