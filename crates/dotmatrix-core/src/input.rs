use crate::interrupt::{Interrupt, InterruptController};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// (true for the direction group, line bit within the group)
    const fn line(self) -> (bool, u8) {
        match self {
            Button::Right => (true, 0x01),
            Button::Left => (true, 0x02),
            Button::Up => (true, 0x04),
            Button::Down => (true, 0x08),
            Button::A => (false, 0x01),
            Button::B => (false, 0x02),
            Button::Select => (false, 0x04),
            Button::Start => (false, 0x08),
        }
    }
}

const SELECT_DPAD: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

/// P1/JOYP (0xFF00). Lines are active low; bits 4-5 pick which group drives
/// them.
#[derive(Clone, Debug)]
pub struct Joypad {
    select: u8,
    dpad: u8,
    buttons: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Self {
            select: SELECT_DPAD | SELECT_BUTTONS,
            dpad: 0,
            buttons: 0,
        }
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines currently pulled low, as a positive mask.
    fn active_lines(&self) -> u8 {
        let mut lines = 0;
        if self.select & SELECT_DPAD == 0 {
            lines |= self.dpad;
        }
        if self.select & SELECT_BUTTONS == 0 {
            lines |= self.buttons;
        }
        lines
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | (!self.active_lines() & 0x0F)
    }

    pub fn write(&mut self, val: u8, ints: &mut InterruptController) {
        self.update(ints, |pad| pad.select = val & 0x30);
    }

    pub fn press(&mut self, button: Button, ints: &mut InterruptController) {
        let (dpad, bit) = button.line();
        self.update(ints, |pad| {
            if dpad {
                pad.dpad |= bit;
            } else {
                pad.buttons |= bit;
            }
        });
    }

    pub fn release(&mut self, button: Button) {
        let (dpad, bit) = button.line();
        if dpad {
            self.dpad &= !bit;
        } else {
            self.buttons &= !bit;
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        let (dpad, bit) = button.line();
        let group = if dpad { self.dpad } else { self.buttons };
        group & bit != 0
    }

    /// Any key held, regardless of the group selection. Used to leave STOP.
    pub fn any_pressed(&self) -> bool {
        self.dpad | self.buttons != 0
    }

    /// Applies `change` and requests the joypad interrupt for every line that
    /// went from high to low.
    fn update(&mut self, ints: &mut InterruptController, change: impl FnOnce(&mut Self)) {
        let before = self.active_lines();
        change(self);
        if self.active_lines() & !before != 0 {
            ints.request(Interrupt::Joypad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unselected_group_reads_high() {
        let mut ints = InterruptController::new();
        let mut pad = Joypad::new();
        pad.press(Button::A, &mut ints);
        assert_eq!(pad.read(), 0xFF);
        assert!(!ints.is_requested(Interrupt::Joypad));

        pad.write(0x10, &mut ints);
        assert_eq!(pad.read(), 0xDE);
        assert!(ints.is_requested(Interrupt::Joypad));
    }

    #[test]
    fn press_on_selected_group_interrupts() {
        let mut ints = InterruptController::new();
        let mut pad = Joypad::new();
        pad.write(0x20, &mut ints);
        pad.press(Button::Down, &mut ints);
        assert_eq!(pad.read() & 0x0F, 0x07);
        assert!(ints.is_requested(Interrupt::Joypad));

        ints.acknowledge(Interrupt::Joypad);
        pad.release(Button::Down);
        assert_eq!(pad.read() & 0x0F, 0x0F);
        assert!(!ints.is_requested(Interrupt::Joypad));
    }
}
