use dotmatrix_core::interrupt::{Interrupt, InterruptController};
use dotmatrix_core::timer::Timer;

fn fast_timer(tima: u8, tma: u8) -> (Timer, InterruptController) {
    let mut ints = InterruptController::new();
    let mut timer = Timer::new();
    timer.write(0xFF06, tma, &mut ints);
    timer.write(0xFF05, tima, &mut ints);
    // Enabled, 16 cycles per increment.
    timer.write(0xFF07, 0x05, &mut ints);
    (timer, ints)
}

#[test]
fn overflow_reads_zero_for_one_m_cycle_then_reloads() {
    let (mut timer, mut ints) = fast_timer(0xFF, 0x42);

    timer.tick(16, &mut ints);
    assert_eq!(timer.read(0xFF05), 0x00);
    assert!(!ints.is_requested(Interrupt::Timer));

    timer.tick(3, &mut ints);
    assert_eq!(timer.read(0xFF05), 0x00);
    assert!(!ints.is_requested(Interrupt::Timer));

    timer.tick(1, &mut ints);
    assert_eq!(timer.read(0xFF05), 0x42);
    assert!(ints.is_requested(Interrupt::Timer));
}

#[test]
fn writing_tima_during_delay_cancels_reload() {
    let (mut timer, mut ints) = fast_timer(0xFF, 0x42);
    timer.tick(17, &mut ints);
    timer.write(0xFF05, 0x10, &mut ints);
    timer.tick(8, &mut ints);
    assert_eq!(timer.read(0xFF05), 0x10);
    assert!(!ints.is_requested(Interrupt::Timer));
}

#[test]
fn each_clock_select_period() {
    for (tac, period) in [(0x04u8, 1024u32), (0x05, 16), (0x06, 64), (0x07, 256)] {
        let mut ints = InterruptController::new();
        let mut timer = Timer::new();
        timer.write(0xFF07, tac, &mut ints);
        timer.tick(period * 3, &mut ints);
        assert_eq!(timer.read(0xFF05), 3, "TAC {tac:02X}");
    }
}

#[test]
fn div_reset_with_selected_bit_high_increments_tima() {
    let mut ints = InterruptController::new();
    let mut timer = Timer::new();
    timer.write(0xFF07, 0x05, &mut ints);
    // Bit 3 goes high after 8 cycles.
    timer.tick(8, &mut ints);
    assert_eq!(timer.read(0xFF05), 0);
    timer.write(0xFF04, 0x12, &mut ints);
    assert_eq!(timer.read(0xFF05), 1);
    assert_eq!(timer.read(0xFF04), 0);
}

#[test]
fn disabling_timer_with_signal_high_increments_tima() {
    let mut ints = InterruptController::new();
    let mut timer = Timer::new();
    timer.write(0xFF07, 0x05, &mut ints);
    timer.tick(8, &mut ints);
    timer.write(0xFF07, 0x01, &mut ints);
    assert_eq!(timer.read(0xFF05), 1);
}

#[test]
fn div_counts_upper_byte() {
    let mut ints = InterruptController::new();
    let mut timer = Timer::new();
    timer.tick(256 * 5 + 10, &mut ints);
    assert_eq!(timer.read(0xFF04), 5);
}
