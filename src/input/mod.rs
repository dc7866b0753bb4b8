// SPDX-License-Identifier: GPL-3.0-only

pub mod bindings;
pub mod gesture;
pub mod grab;
mod keybindings;

use smithay::{
    backend::input::{
        AbsolutePositionEvent, Axis, AxisSource, ButtonState, Device, DeviceCapability, Event,
        InputBackend, InputEvent, KeyState, KeyboardKeyEvent, PointerAxisEvent,
        PointerButtonEvent, PointerMotionEvent, TouchDownEvent, TouchEvent, TouchMotionEvent,
        TouchUpEvent,
    },
    desktop::PopupManager,
    input::{
        keyboard::{keysyms as xkb, FilterResult, Keysym},
        pointer::{AxisFrame, ButtonEvent, MotionEvent},
        Seat, SeatHandler, SeatState,
    },
    reexports::wayland_server::protocol::wl_surface::WlSurface,
    utils::{Point, SERIAL_COUNTER},
};
use std::process::Command;
use tracing::{debug, info, trace};

use self::bindings::{Activator, ModifiersStateKey};
use self::gesture::{Direction, GestureKind};
use self::grab::{Grab, GrabOrigin};
use self::keybindings::{Action, Keybindings};
use crate::shell::output::FocusFlags;
use crate::State;

/// Button 272 is the left mouse button (`BTN_LEFT`): the raw evdev code
/// `PointerButtonEvent::button_code` reports, not a smithay constant.
const BTN_LEFT: u32 = 0x110;

/// `Ctrl+Alt+Fn` requests a VT switch, following the original's mapping of
/// F1 onto VT 1. `None` for anything outside F1..F12.
fn vt_switch_target(sym: Keysym) -> Option<i32> {
    let raw = sym.raw();
    if (xkb::KEY_F1..=xkb::KEY_F12).contains(&raw) {
        Some((raw - xkb::KEY_F1 + 1) as i32)
    } else {
        None
    }
}

impl State {
    /// The output the pointer is currently over, falling back to the
    /// first known output; `None` only once no output has been added yet.
    fn focused_output(&self) -> Option<smithay::output::Output> {
        let pointer_loc = self.seat.get_pointer()?.current_location();
        let shell = self.shell.read().unwrap();
        shell.output_at(pointer_loc).or_else(|| self.outputs.first().cloned())
    }

    /// Dismiss every popup rooted at `surface`, e.g. when focus moves away
    /// from it and [`FocusFlags::CLOSE_POPUPS`] was set.
    fn dismiss_popups_for(&mut self, surface: &WlSurface) {
        for (popup, _location) in PopupManager::popups_for_surface(surface) {
            let _ = PopupManager::dismiss_popup(surface, &popup);
        }
    }

    /// Cancel whatever grab is currently active, releasing its capability
    /// mask back to the output it was grabbed on.
    fn cancel_active_grab(&mut self) {
        let Some(output) = self.focused_output() else { return };
        let mut shell = self.shell.write().unwrap();
        match shell.grab.end() {
            Some(Grab::Plugin { name, .. }) => {
                if let Some(shell_output) = shell.output_shell_mut(&output) {
                    shell_output.deactivate_plugin(name);
                }
            }
            Some(_) | None => {}
        }
    }

    /// Translate a recognized touch gesture into a window-management
    /// action, mirroring the set of actions a keybinding can trigger.
    fn handle_gesture(&mut self, gesture: gesture::Gesture) {
        debug!(kind = ?gesture.kind, direction = ?gesture.direction, fingers = gesture.finger_count, "Gesture recognized");
        match gesture.kind {
            GestureKind::Swipe | GestureKind::EdgeSwipe => {
                if gesture.direction.contains(Direction::LEFT) {
                    self.handle_action(Action::FocusPrev);
                } else if gesture.direction.contains(Direction::RIGHT) {
                    self.handle_action(Action::FocusNext);
                } else if gesture.direction.contains(Direction::UP) {
                    self.handle_action(Action::Zoom);
                } else if gesture.direction.contains(Direction::DOWN) {
                    self.handle_action(Action::ToggleFloating);
                }
            }
            GestureKind::Pinch => {
                if gesture.direction.contains(Direction::IN) {
                    self.handle_action(Action::CloseWindow);
                } else {
                    self.handle_action(Action::ToggleFloating);
                }
            }
        }
    }

    /// Process input events from the backend
    pub fn process_input_event_impl<B: InputBackend>(&mut self, event: InputEvent<B>)
    where
        <B as InputBackend>::Device: 'static,
    {
        match event {
            InputEvent::DeviceAdded { device } => {
                info!("Device added: {:?}", device.name());

                // add device to our main seat
                {
                    let seat = &self.seat;
                    // configure keyboard if device has keyboard capability
                    if device.has_capability(DeviceCapability::Keyboard) {
                        let _keyboard = seat.get_keyboard().unwrap();
                        // keyboard config is already set in State::new
                    }
                }
            }

            InputEvent::DeviceRemoved { device } => {
                info!("Device removed: {:?}", device.name());
            }

            InputEvent::Keyboard { event, .. } => {
                let keycode = event.key_code();
                let key_state = event.state();
                trace!(?keycode, ?key_state, "Keyboard event");

                let output = self.focused_output();

                {
                    let seat = &self.seat;
                    let serial = SERIAL_COUNTER.next_serial();
                    let time = Event::time_msec(&event);
                    let keyboard = seat.get_keyboard().unwrap();

                    let keybindings = Keybindings::new();

                    keyboard.input(
                        self,
                        keycode,
                        key_state,
                        serial,
                        time,
                        |state, modifiers, keysym| {
                            let sym = keysym.modified_sym();
                            debug!(
                                ?keycode,
                                ?sym,
                                ?modifiers,
                                ?key_state,
                                "Key event",
                            );

                            // 1. VT switch requests take priority over
                            // everything else and are never forwarded.
                            if key_state == KeyState::Pressed && modifiers.ctrl && modifiers.alt {
                                if let Some(vt) = vt_switch_target(sym) {
                                    info!(vt, "Requesting VT switch");
                                    state.backend.change_vt(vt);
                                    return FilterResult::Intercept(());
                                }
                            }

                            // 2. Escape cancels whatever grab is active
                            // (interactive move/resize or a plugin grab)
                            // instead of reaching the client.
                            if key_state == KeyState::Pressed
                                && sym.raw() == xkb::KEY_Escape
                                && state.shell.read().unwrap().grab.is_grabbed()
                            {
                                state.cancel_active_grab();
                                return FilterResult::Intercept(());
                            }

                            // 3. dynamic per-output binding table, scanned
                            // before the static compiled-in keybindings so a
                            // plugin-registered binding can shadow them.
                            if key_state == KeyState::Pressed {
                                let activator = Activator::Key {
                                    modifiers: ModifiersStateKey::from(modifiers),
                                    keysym: sym.raw(),
                                };
                                let fired = if let Some(output) = &output {
                                    let mut shell = state.shell.write().unwrap();
                                    shell
                                        .output_shell_mut(output)
                                        .map(|shell_output| {
                                            shell_output.bindings.dispatch(activator, None, |id, tag| {
                                                trace!(binding_id = id, callback_tag = tag, "binding fired");
                                            })
                                        })
                                        .unwrap_or_default()
                                } else {
                                    Vec::new()
                                };
                                if !fired.is_empty() {
                                    return FilterResult::Intercept(());
                                }
                            }

                            // 4. static, compiled-in keybindings.
                            if let Some(action) = keybindings.check(modifiers, sym, key_state) {
                                state.handle_action(action);
                                FilterResult::Intercept(())
                            } else {
                                // 5. nothing consumed it: forward to client.
                                FilterResult::Forward
                            }
                        },
                    );
                }
            }

            InputEvent::PointerMotion { event, .. } => {
                let delta = event.delta();
                trace!(?delta, "Pointer motion");

                let mut location = {
                    let pointer = self.seat.get_pointer().unwrap();
                    pointer.current_location()
                };
                location += delta;
                location.x = location.x.max(0.0);
                location.y = location.y.max(0.0);

                self.handle_pointer_position(location, Event::time_msec(&event));
            }

            InputEvent::PointerMotionAbsolute { event, .. } => {
                trace!("Pointer absolute motion");

                // for now use a default output size for normalization
                let output_size = (1920.0, 1080.0);
                let location = Point::from((event.x() * output_size.0, event.y() * output_size.1));

                self.handle_pointer_position(location, Event::time_msec(&event));
            }

            InputEvent::PointerButton { event, .. } => {
                let button = event.button_code();
                let button_state = event.state();
                debug!(button, ?button_state, "Pointer button");

                if button_state == ButtonState::Pressed {
                    self.handle_pointer_button_press(button);
                } else if button == BTN_LEFT {
                    // releasing the button that started an interactive
                    // move/resize ends it.
                    if matches!(self.shell.read().unwrap().grab.current(), Some(Grab::Move { .. } | Grab::Resize { .. })) {
                        self.shell.write().unwrap().grab.end();
                    }
                }

                let seat = &self.seat;
                let pointer = seat.get_pointer().unwrap();
                let serial = SERIAL_COUNTER.next_serial();
                let time = Event::time_msec(&event);

                pointer.button(
                    self,
                    &ButtonEvent {
                        button,
                        state: button_state.into(),
                        serial,
                        time,
                    },
                );
            }

            InputEvent::PointerAxis { event, .. } => {
                trace!("Pointer axis");

                let seat = &self.seat;
                let pointer = seat.get_pointer().unwrap();
                let source = event.source();

                let mut frame = AxisFrame::new(Event::time_msec(&event)).source(source);

                if let Some(horizontal) = event.amount(Axis::Horizontal) {
                    frame = frame.value(Axis::Horizontal, horizontal);
                    if let Some(discrete) = event.amount_v120(Axis::Horizontal) {
                        frame = frame.v120(Axis::Horizontal, discrete as i32);
                    }
                }

                if let Some(vertical) = event.amount(Axis::Vertical) {
                    frame = frame.value(Axis::Vertical, vertical);
                    if let Some(discrete) = event.amount_v120(Axis::Vertical) {
                        frame = frame.v120(Axis::Vertical, discrete as i32);
                    }
                }

                if source == AxisSource::Finger
                    && event.amount(Axis::Horizontal) == Some(0.0)
                    && event.amount(Axis::Vertical) == Some(0.0)
                {
                    frame = frame.stop(Axis::Horizontal).stop(Axis::Vertical);
                }

                pointer.axis(self, frame);
            }

            InputEvent::TouchDown { event } => {
                let output_size = (1920.0, 1080.0);
                let at = Point::from((event.x() * output_size.0, event.y() * output_size.1));
                let id = self.touch_slot_id(event.slot());
                trace!(id, ?at, "Touch down");
                self.gesture.touch_down(id, at);
            }

            InputEvent::TouchMotion { event } => {
                let output_size = (1920.0, 1080.0);
                let at = Point::from((event.x() * output_size.0, event.y() * output_size.1));
                let id = self.touch_slot_id(event.slot());
                if let Some(gesture) = self.gesture.touch_motion(id, at) {
                    self.handle_gesture(gesture);
                }
            }

            InputEvent::TouchUp { event } => {
                let id = self.touch_slot_id(event.slot());
                trace!(id, "Touch up");
                self.gesture.touch_up(id);
                self.release_touch_slot(event.slot());
            }

            _ => {
                // ignore other events for now
                trace!("Unhandled input event");
            }
        }
    }

    /// Shared tail of both absolute and relative pointer motion: drives an
    /// active interactive move grab if one is running, otherwise the
    /// normal motion-forwarding-to-client path.
    fn handle_pointer_position(&mut self, location: Point<f64, smithay::utils::Logical>, time: u32) {
        let grabbed_move = {
            let shell = self.shell.read().unwrap();
            match shell.grab.current() {
                Some(Grab::Move { window, origin }) => Some((window.clone(), origin.clone())),
                _ => None,
            }
        };

        if let Some((window, origin)) = grabbed_move {
            let delta = location - origin.pointer_start;
            let new_loc = Point::from((
                origin.window_start.x + delta.x.round() as i32,
                origin.window_start.y + delta.y.round() as i32,
            ));
            self.shell.write().unwrap().space.map_element(window, new_loc, false);
            if let Some(output) = self.focused_output() {
                self.backend.schedule_render(&output);
            }
            return;
        }

        let seat = &self.seat;
        let pointer = seat.get_pointer().unwrap();
        let serial = SERIAL_COUNTER.next_serial();

        let surface_under = self.shell.read().unwrap().surface_under(location);

        pointer.motion(
            self,
            surface_under,
            &MotionEvent { location, serial, time },
        );

        self.shell.write().unwrap().cursor_position = location;

        if let Some(output) = self.shell.read().unwrap().output_at(location) {
            self.backend.schedule_render(&output);
        }
    }

    /// The button-press half of `InputEvent::PointerButton`: focuses the
    /// window under the cursor (dismissing popups rooted at whatever was
    /// focused before), or, if the modifier-key-plus-left-click chord is
    /// held over a window, starts an interactive move grab instead.
    fn handle_pointer_button_press(&mut self, button: u32) {
        let pointer_loc = self.seat.get_pointer().unwrap().current_location();
        debug!(?pointer_loc, "Button pressed");

        let window_under = self.shell.read().unwrap().window_under(pointer_loc);

        let Some(window) = window_under else {
            debug!("No window found under cursor for focus");
            return;
        };

        let modifiers = self
            .seat
            .get_keyboard()
            .map(|kb| kb.modifier_state())
            .unwrap_or_default();

        if modifiers.logo && button == BTN_LEFT && !self.shell.read().unwrap().grab.is_grabbed() {
            if let Some(window_start) = self.shell.read().unwrap().space.element_location(&window) {
                let origin = GrabOrigin { pointer_start: pointer_loc, window_start };
                self.shell.write().unwrap().grab.start(Grab::Move { window: window.clone(), origin });
                return;
            }
        }

        let Some(output) = self.focused_output() else { return };

        let previous_surface = self
            .shell
            .read()
            .unwrap()
            .focused_window
            .clone()
            .and_then(|w| w.toplevel().map(|t| t.wl_surface().clone()));

        let focused = self.shell.write().unwrap().focus_window(
            &window,
            &output,
            FocusFlags::RAISE | FocusFlags::CLOSE_POPUPS,
        );

        if !focused {
            return;
        }

        if let Some(previous_surface) = previous_surface {
            self.dismiss_popups_for(&previous_surface);
        }

        if let Some(surface) = window.toplevel().map(|t| t.wl_surface().clone()) {
            let keyboard = self.seat.get_keyboard().unwrap();
            let serial = SERIAL_COUNTER.next_serial();
            keyboard.set_focus(self, Some(surface), serial);
            debug!("Set keyboard focus to clicked window");
        }
    }

    /// Handle a keybinding action
    fn handle_action(&mut self, action: Action) {
        use Action::*;

        match action {
            // window management
            FocusNext => self.cycle_focus_and_sync(1),
            FocusPrev => self.cycle_focus_and_sync(-1),
            Zoom => {
                let mut shell = self.shell.write().unwrap();
                shell.zoom();
            }
            CloseWindow => {
                let mut shell = self.shell.write().unwrap();
                shell.close_focused();
            }
            ToggleFloating => {
                let mut shell = self.shell.write().unwrap();
                if let Some(window) = shell.focused_window.clone() {
                    shell.toggle_floating(&window);
                }
            }

            // layout control: applied to the output under the pointer,
            // falling back to the first known output.
            IncreaseMasterWidth => {
                if let Some(output) = self.focused_output() {
                    self.shell.write().unwrap().adjust_master_factor(&output, 0.05);
                }
            }
            DecreaseMasterWidth => {
                if let Some(output) = self.focused_output() {
                    self.shell.write().unwrap().adjust_master_factor(&output, -0.05);
                }
            }
            IncreaseMasterCount => {
                if let Some(output) = self.focused_output() {
                    self.shell.write().unwrap().adjust_n_master(&output, 1);
                }
            }
            DecreaseMasterCount => {
                if let Some(output) = self.focused_output() {
                    self.shell.write().unwrap().adjust_n_master(&output, -1);
                }
            }

            // applications
            LaunchTerminal => {
                info!("Launching terminal");
                if let Err(e) = Command::new("foot").spawn() {
                    tracing::error!("Failed to launch terminal: {}", e);
                }
            }
            LaunchMenu => {
                info!("Launching menu");
                // try common menu programs
                if Command::new("rofi").arg("-show").arg("drun").spawn().is_err()
                    && Command::new("dmenu_run").spawn().is_err()
                {
                    tracing::warn!("No menu program found (tried rofi, dmenu_run)");
                }
            }

            // system
            Quit => {
                info!("Quit requested via keybinding");
                self.loop_signal.stop();
                self.should_stop = true;
            }
        }
    }

    /// `FocusNext`/`FocusPrev`: cycle the focus stack, then route the
    /// result through the focused output's [`FocusFlags`] bookkeeping and
    /// update keyboard focus to match.
    fn cycle_focus_and_sync(&mut self, direction: i32) {
        let focused = {
            let mut shell = self.shell.write().unwrap();
            if direction >= 0 {
                shell.focus_next();
            } else {
                shell.focus_prev();
            }
            shell.focused_window.clone()
        };

        let Some(window) = focused else { return };
        let Some(output) = self.focused_output() else { return };

        self.shell.write().unwrap().focus_window(&window, &output, FocusFlags::RAISE);

        if let Some(surface) = window.toplevel().map(|t| t.wl_surface().clone()) {
            let keyboard = self.seat.get_keyboard().unwrap();
            let serial = SERIAL_COUNTER.next_serial();
            keyboard.set_focus(self, Some(surface), serial);
        }
    }
}

// implement SeatHandler for State
impl SeatHandler for State {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Self> {
        &mut self.seat_state
    }

    fn cursor_image(&mut self, seat: &Seat<Self>, image: smithay::input::pointer::CursorImageStatus) {
        // store cursor status in seat user data (following cosmic-comp)
        let cursor_status = seat.user_data().get::<std::sync::Mutex<smithay::input::pointer::CursorImageStatus>>().unwrap();
        *cursor_status.lock().unwrap() = image.clone();

        // also store in shell for rendering
        self.shell.write().unwrap().cursor_status = image;

        // schedule render for the output containing the cursor
        let cursor_position = self.shell.read().unwrap().cursor_position;
        if let Some(output) = self.shell.read().unwrap().output_at(cursor_position) {
            self.backend.schedule_render(&output);
        }
    }

    fn focus_changed(&mut self, _seat: &Seat<Self>, _focused: Option<&Self::KeyboardFocus>) {
        // we'll handle focus changes when we have windows
    }
}
