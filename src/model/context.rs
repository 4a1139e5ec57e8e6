//! Typed per-step process state.
//!
//! Replaces an open-ended key-value bag with the small fixed set of
//! quantities the solving phases actually exchange: current time, time
//! step size, step index and the active BDF coefficients.

use crate::error::{Error, Result};

/// Backward Differentiation Formula coefficients for one time step.
///
/// The first derivative of a buffered quantity is recovered as
/// `d/dt u = c[0]*u_n + c[1]*u_{n-1} (+ c[2]*u_{n-2})`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BdfCoefficients {
    /// Integration order (1 or 2).
    pub order: usize,
    /// Coefficients `c[0..=order]`; unused entries are zero.
    pub c: [f64; 3],
}

impl BdfCoefficients {
    /// Compute the coefficients of the given order for time step `dt`.
    ///
    /// # Errors
    /// Fails for `dt <= 0` or an unsupported order.
    pub fn new(order: usize, dt: f64) -> Result<Self> {
        if dt <= 0.0 {
            return Err(Error::Numeric(format!(
                "BDF coefficients require a positive time step, got {}",
                dt
            )));
        }
        let c = match order {
            1 => [1.0 / dt, -1.0 / dt, 0.0],
            2 => [1.5 / dt, -2.0 / dt, 0.5 / dt],
            _ => {
                return Err(Error::Config(format!(
                    "unsupported BDF order {} (supported: 1, 2)",
                    order
                )))
            }
        };
        Ok(Self { order, c })
    }

    /// Leading coefficient `c[0]`.
    pub fn c0(&self) -> f64 {
        self.c[0]
    }
}

/// Process-wide state for the current solution step.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Current simulation time.
    pub time: f64,
    /// Time step size. May be negative in adjoint (reverse-time) runs;
    /// consumers that need a magnitude sign-correct it explicitly.
    pub delta_time: f64,
    /// Step index, starting at 0 before the first step.
    pub step: usize,
    /// BDF coefficients of the active scheme, set during
    /// `initialize_solution_step`.
    pub bdf: Option<BdfCoefficients>,
}

impl ProcessContext {
    pub fn new(delta_time: f64) -> Self {
        Self {
            time: 0.0,
            delta_time,
            step: 0,
            bdf: None,
        }
    }

    /// Advance to the next step.
    pub fn advance(&mut self) {
        self.time += self.delta_time;
        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bdf1_coefficients() {
        let bdf = BdfCoefficients::new(1, 0.5).unwrap();
        assert_relative_eq!(bdf.c[0], 2.0);
        assert_relative_eq!(bdf.c[1], -2.0);
        assert_eq!(bdf.c[2], 0.0);
    }

    #[test]
    fn test_bdf2_coefficients() {
        let dt = 0.1;
        let bdf = BdfCoefficients::new(2, dt).unwrap();
        assert_relative_eq!(bdf.c[0], 1.5 / dt);
        assert_relative_eq!(bdf.c[1], -2.0 / dt);
        assert_relative_eq!(bdf.c[2], 0.5 / dt);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(BdfCoefficients::new(2, 0.0).is_err());
        assert!(BdfCoefficients::new(2, -0.1).is_err());
        assert!(BdfCoefficients::new(3, 0.1).is_err());
    }

    #[test]
    fn test_context_advance() {
        let mut ctx = ProcessContext::new(0.25);
        ctx.advance();
        ctx.advance();
        assert_eq!(ctx.step, 2);
        assert_relative_eq!(ctx.time, 0.5);
    }
}
