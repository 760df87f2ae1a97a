//! Loss function for causal language model training
//!
//! Next-token cross-entropy with padding positions masked out. Labels are
//! the input IDs themselves; the shift by one position happens here.

use anyhow::Result;
use candle_core::{DType, Tensor, D};

/// Shifted cross-entropy over a `[batch, seq, vocab]` logits tensor
///
/// Position t is scored against the token at t+1. Positions whose shifted
/// attention mask is 0 contribute nothing, so right-padding never trains
/// the model to emit pad tokens.
pub fn causal_lm_loss(logits: &Tensor, labels: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (_batch, seq_len, vocab) = logits.dims3()?;
    if seq_len < 2 {
        anyhow::bail!("Sequence too short for next-token loss: {}", seq_len);
    }

    let shift_logits = logits.narrow(1, 0, seq_len - 1)?;
    let shift_labels = labels.narrow(1, 1, seq_len - 1)?;
    let shift_mask = attention_mask.narrow(1, 1, seq_len - 1)?;

    let flat_logits = shift_logits.reshape(((), vocab))?;
    let flat_labels = shift_labels.reshape(((),))?.to_dtype(DType::U32)?;
    let flat_mask = shift_mask.reshape(((),))?.to_dtype(DType::F32)?;

    let log_probs = candle_nn::ops::log_softmax(&flat_logits, D::Minus1)?;
    let picked = log_probs
        .gather(&flat_labels.unsqueeze(1)?, 1)?
        .squeeze(1)?;
    let nll = picked.neg()?;

    let masked = (nll * &flat_mask)?;
    let token_count = flat_mask.sum_all()?.clamp(1.0, f64::MAX)?;
    let loss = (masked.sum_all()? / token_count)?;

    Ok(loss)
}

/// Perplexity from an average cross-entropy loss
pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn make_inputs(
        logit_rows: Vec<Vec<f32>>,
        labels: Vec<u32>,
        mask: Vec<u32>,
    ) -> (Tensor, Tensor, Tensor) {
        let seq = logit_rows.len();
        let vocab = logit_rows[0].len();
        let flat: Vec<f32> = logit_rows.into_iter().flatten().collect();

        let logits = Tensor::from_vec(flat, (1, seq, vocab), &Device::Cpu).unwrap();
        let labels = Tensor::from_vec(labels, (1, seq), &Device::Cpu).unwrap();
        let mask = Tensor::from_vec(mask, (1, seq), &Device::Cpu).unwrap();
        (logits, labels, mask)
    }

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let vocab = 10;
        let (logits, labels, mask) = make_inputs(
            vec![vec![0.0; vocab]; 4],
            vec![1, 2, 3, 4],
            vec![1, 1, 1, 1],
        );

        let loss = causal_lm_loss(&logits, &labels, &mask).unwrap();
        let value = loss.to_scalar::<f32>().unwrap();
        assert!((value - (vocab as f32).ln()).abs() < 1e-4);
    }

    #[test]
    fn test_confident_logits_give_near_zero_loss() {
        let labels = vec![1u32, 2, 3, 4];
        let mut rows = vec![vec![0.0f32; 10]; 4];
        for t in 0..3 {
            rows[t][labels[t + 1] as usize] = 100.0;
        }

        let (logits, labels, mask) = make_inputs(rows, labels, vec![1, 1, 1, 1]);
        let loss = causal_lm_loss(&logits, &labels, &mask).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap() < 1e-3);
    }

    #[test]
    fn test_padding_positions_are_ignored() {
        // Correct predictions on real positions, garbage on padded ones
        let labels = vec![1u32, 2, 0, 0];
        let mut rows = vec![vec![0.0f32; 10]; 4];
        rows[0][2] = 100.0;
        rows[1][9] = 100.0; // wrong, but position 2 is padding
        rows[2][9] = 100.0;

        let (logits, labels, mask) = make_inputs(rows, labels, vec![1, 1, 0, 0]);
        let loss = causal_lm_loss(&logits, &labels, &mask).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap() < 1e-3);
    }

    #[test]
    fn test_single_token_sequence_rejected() {
        let (logits, labels, mask) = make_inputs(vec![vec![0.0; 10]], vec![1], vec![1]);
        assert!(causal_lm_loss(&logits, &labels, &mask).is_err());
    }

    #[test]
    fn test_perplexity() {
        assert!((perplexity(0.0) - 1.0).abs() < 1e-9);
        assert!((perplexity((10.0f64).ln()) - 10.0).abs() < 1e-9);
    }
}
