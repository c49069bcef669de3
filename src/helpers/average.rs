#[derive(Default)]
pub struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// `NaN` when nothing has been pushed.
    #[must_use]
    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }
}

impl FromIterator<f64> for Average {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut average = Self::default();
        for value in iter {
            average.push(value);
        }
        average
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_ok() {
        let average: Average = [0.1, 0.2, 0.3].into_iter().collect();
        assert!((average.average() - 0.2).abs() < 1e-12);
        assert!(Average::default().average().is_nan());
    }
}
