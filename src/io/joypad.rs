//! The joypad is a 2x4 button matrix: the register's upper write nibble
//! selects either the direction row or the action row, and the lower read
//! nibble reports the selected row with pressed keys pulled low.

use bitflags::*;

use crate::io::interrupts::{InterruptFlags, Interrupts};

pub const JOYPAD_REGISTER: u16 = 0xFF00;

#[derive(Debug, Copy, Clone, PartialOrd, PartialEq)]
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

bitflags! {
    struct MatrixLines: u8 {
        /// Right or A
        const RIGHT_A    = 0b0000_0001;
        /// Left or B
        const LEFT_B     = 0b0000_0010;
        /// Up or Select
        const UP_SELECT  = 0b0000_0100;
        /// Down or Start
        const DOWN_START = 0b0000_1000;
    }
}

impl Button {
    fn matrix_line(self) -> MatrixLines {
        match self {
            Button::Right | Button::A => MatrixLines::RIGHT_A,
            Button::Left | Button::B => MatrixLines::LEFT_B,
            Button::Up | Button::Select => MatrixLines::UP_SELECT,
            Button::Down | Button::Start => MatrixLines::DOWN_START,
        }
    }

    fn is_direction(self) -> bool {
        matches!(self, Button::Right | Button::Left | Button::Up | Button::Down)
    }
}

#[derive(Debug, Clone)]
pub struct JoyPad {
    held_directions: MatrixLines,
    held_actions: MatrixLines,
    select_directions: bool,
    select_actions: bool,
}

impl JoyPad {
    pub fn new() -> Self {
        JoyPad {
            held_directions: MatrixLines::empty(),
            held_actions: MatrixLines::empty(),
            select_directions: false,
            select_actions: false,
        }
    }

    /// A pressed key reads as 0; the upper two bits are unwired and read 1.
    pub fn read_register(&self) -> u8 {
        let mut result = 0xC0;
        result |= (!self.select_directions as u8) << 4;
        result |= (!self.select_actions as u8) << 5;

        let mut row = MatrixLines::empty();
        if self.select_directions {
            row |= self.held_directions;
        }
        if self.select_actions {
            row |= self.held_actions;
        }

        result | !row.bits() & 0x0F
    }

    /// Only the two row-select bits are writable, and they select when low.
    pub fn write_register(&mut self, value: u8) {
        self.select_directions = value & 0x10 == 0;
        self.select_actions = value & 0x20 == 0;
    }

    pub fn press(&mut self, button: Button, interrupts: &mut Interrupts) {
        let line = button.matrix_line();
        let selected = if button.is_direction() {
            self.held_directions.insert(line);
            self.select_directions
        } else {
            self.held_actions.insert(line);
            self.select_actions
        };

        // A high-to-low transition on a selected column requests the joypad
        // interrupt.
        if selected {
            interrupts.request(InterruptFlags::JOYPAD);
        }
    }

    pub fn release(&mut self, button: Button) {
        let line = button.matrix_line();
        if button.is_direction() {
            self.held_directions.remove(line);
        } else {
            self.held_actions.remove(line);
        }
    }

    /// True while any key at all is held; the STOP wake-up condition.
    pub fn any_key_held(&self) -> bool {
        !(self.held_directions | self.held_actions).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::interrupts::Interrupts;

    #[test]
    fn unselected_rows_read_released() {
        let mut joypad = JoyPad::new();
        let mut interrupts = Interrupts::default();

        joypad.press(Button::A, &mut interrupts);
        joypad.write_register(0x10); // select actions only
        assert_eq!(joypad.read_register(), 0xDE);

        joypad.write_register(0x20); // select directions only
        assert_eq!(joypad.read_register(), 0xEF);
    }

    #[test]
    fn press_on_selected_row_requests_interrupt() {
        let mut joypad = JoyPad::new();
        let mut interrupts = Interrupts::default();

        joypad.write_register(0x20);
        joypad.press(Button::Start, &mut interrupts);
        assert!(interrupts.interrupt_flag.is_empty());

        joypad.write_register(0x10);
        joypad.press(Button::Start, &mut interrupts);
        assert!(interrupts.interrupt_flag.contains(InterruptFlags::JOYPAD));
    }

    #[test]
    fn release_clears_the_matrix_line() {
        let mut joypad = JoyPad::new();
        let mut interrupts = Interrupts::default();

        joypad.press(Button::Left, &mut interrupts);
        assert!(joypad.any_key_held());
        joypad.release(Button::Left);
        assert!(!joypad.any_key_held());
    }
}
