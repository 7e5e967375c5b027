//! The hardware timer resource shared by all software PWM channels.

/// A counter that counts up at [`tick_rate`](Self::tick_rate), wraps back to zero every
/// `period_ticks` ticks and raises one interrupt when it matches the compare value.
///
/// The compare match does not repeat on its own: the interrupt handler re-arms it on every call
/// through [`set_compare`](Self::set_compare). A compare value of `0` matches at the wrap.
pub trait HardwareTimer {
    /// Counter frequency in Hz.
    fn tick_rate(&self) -> u32;

    /// Largest period the counter can represent.
    fn max_ticks(&self) -> u32 {
        u32::MAX
    }

    /// Takes exclusive ownership of the underlying peripheral.
    ///
    /// Returns `false` if another consumer has already claimed it.
    fn claim(&mut self) -> bool;

    /// Gives up the claim taken with [`claim`](Self::claim).
    fn release(&mut self);

    /// Resets the counter to zero and starts counting with the given wrap period. The compare
    /// interrupt is enabled.
    fn start(&mut self, period_ticks: u32);

    /// Stops the counter, disables the compare interrupt and clears a pending one.
    ///
    /// Once this returns no further interrupt is delivered for this timer.
    fn stop(&mut self);

    /// Current counter value, in `0..period_ticks`.
    fn counter(&mut self) -> u32;

    /// Programs the next compare match.
    fn set_compare(&mut self, tick: u32);

    /// Acknowledges the compare interrupt.
    fn clear_interrupt(&mut self);
}
