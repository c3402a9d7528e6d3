use crate::drivers::SummaryError;

/// Both trial statistics over the same readings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub rms: f64,
    pub am: f64,
    pub count: usize,
}

/// Root mean square: `sqrt((1/N) * sum(x^2))`.
pub fn rms(values: &[f64]) -> Result<f64, SummaryError> {
    if values.is_empty() {
        return Err(SummaryError::EmptySequence);
    }
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    Ok((sum_sq / values.len() as f64).sqrt())
}

/// Mean of the raw signal, used as the amplitude proxy.
pub fn am(values: &[f64]) -> Result<f64, SummaryError> {
    if values.is_empty() {
        return Err(SummaryError::EmptySequence);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn summarize(values: &[f64]) -> Result<Summary, SummaryError> {
    Ok(Summary {
        rms: rms(values)?,
        am: am(values)?,
        count: values.len(),
    })
}
