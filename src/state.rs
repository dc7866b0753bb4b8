// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use smithay::{
    backend::input::InputEvent,
    desktop::{PopupManager, Window},
    input::{pointer::CursorImageStatus, Seat, SeatState, TouchSlot},
    output::Output,
    reexports::{
        calloop::{LoopHandle, LoopSignal},
        wayland_server::{Display, DisplayHandle},
    },
    wayland::{
        compositor::CompositorState,
        dmabuf::DmabufState,
        selection::{data_device::DataDeviceState, primary_selection::PrimarySelectionState},
        shell::{
            wlr_layer::WlrLayerShellState,
            xdg::{decoration::XdgDecorationState, ToplevelSurface, XdgShellState},
        },
        shm::ShmState,
        xdg_activation::XdgActivationState,
    },
};

use crate::backend::kms::KmsState;
use crate::backend::render::cursor::CursorState;
use crate::config::Config;
use crate::input::gesture::GestureRecognizer;
use crate::shell::Shell;
use crate::wayland::handlers::idle_inhibit::IdleInhibitState;
use crate::wayland::output_configuration::OutputConfigurationState;

/// Backend data enum
pub enum BackendData {
    Uninitialized,
    Kms(KmsState),
    // we could add other backends later
}

impl BackendData {
    /// Schedule a render pass for `output` on whichever backend is active.
    /// A no-op before the backend has finished initializing.
    pub fn schedule_render(&mut self, output: &Output) {
        match self {
            BackendData::Kms(kms) => kms.schedule_render(output),
            BackendData::Uninitialized => {}
        }
    }

    /// Request a VT switch through the session. A no-op on a backend
    /// without a login-session handle (or before it's initialized).
    pub fn change_vt(&mut self, vt: i32) {
        match self {
            BackendData::Kms(kms) => {
                use smithay::backend::session::Session;
                if let Err(err) = kms.session.change_vt(vt) {
                    tracing::error!(?err, vt, "Failed to switch VT");
                }
            }
            BackendData::Uninitialized => {}
        }
    }
}

/// The main compositor state
pub struct State {
    pub display_handle: DisplayHandle,
    pub loop_handle: LoopHandle<'static, State>,
    pub loop_signal: LoopSignal,
    pub should_stop: bool,
    pub socket_name: String,
    pub backend: BackendData,
    session_active: bool,

    pub config: Config,

    pub shell: Arc<RwLock<Shell>>,
    pub outputs: Vec<Output>,
    pub pending_windows: Vec<(ToplevelSurface, Window)>,
    pub popups: PopupManager,
    pub needs_focus_refresh: bool,

    /// Touch-point gesture recognition, shared across every touch device on
    /// the seat.
    pub gesture: GestureRecognizer,
    /// Backend `TouchSlot`s mapped to the small integer ids the gesture
    /// recognizer keys fingers by, assigned at touch-down and freed at
    /// touch-up.
    touch_slots: HashMap<TouchSlot, i32>,
    next_touch_slot_id: i32,

    pub seat: Seat<State>,
    pub seat_state: SeatState<State>,

    pub compositor_state: CompositorState,
    pub xdg_shell_state: XdgShellState,
    pub xdg_decoration_state: XdgDecorationState,
    pub shm_state: ShmState,
    pub data_device_state: DataDeviceState,
    pub primary_selection_state: PrimarySelectionState,
    pub xdg_activation_state: XdgActivationState,
    pub idle_inhibit_state: IdleInhibitState,
    pub dmabuf_state: DmabufState,
    pub layer_shell_state: WlrLayerShellState,
    pub output_configuration_state: OutputConfigurationState,
}

// suppress warnings for now - we'll use these soon
#[allow(dead_code)]
impl State {
    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }
}

impl State {
    pub fn new(
        display: &Display<State>,
        socket_name: String,
        loop_handle: LoopHandle<'static, State>,
        loop_signal: LoopSignal,
        config: Config,
    ) -> Self {
        let display_handle = display.handle();

        let compositor_state = CompositorState::new::<Self>(&display_handle);
        let xdg_shell_state = XdgShellState::new::<Self>(&display_handle);
        let xdg_decoration_state = XdgDecorationState::new::<Self>(&display_handle);
        let shm_state = ShmState::new::<Self>(&display_handle, vec![]);
        let data_device_state = DataDeviceState::new::<Self>(&display_handle);
        let primary_selection_state = PrimarySelectionState::new::<Self>(&display_handle);
        let xdg_activation_state = XdgActivationState::new::<Self>(&display_handle);
        let idle_inhibit_state = IdleInhibitState::new();
        let dmabuf_state = DmabufState::new();
        let layer_shell_state = WlrLayerShellState::new::<Self>(&display_handle);

        let output_configuration_state =
            OutputConfigurationState::new(&display_handle, |_client| true);

        let mut seat_state = SeatState::new();
        let mut seat: Seat<Self> = seat_state.new_wl_seat(&display_handle, "seat0");

        let xkb_config = smithay::input::keyboard::XkbConfig::default();
        if let Err(err) = seat.add_keyboard(xkb_config, 200, 25) {
            tracing::error!(?err, "Failed to initialize keyboard on seat");
        }
        seat.add_pointer();

        seat.user_data().insert_if_missing(CursorState::default);
        seat.user_data()
            .insert_if_missing(|| Mutex::new(CursorImageStatus::default_named()));

        Self {
            display_handle,
            loop_handle,
            loop_signal,
            should_stop: false,
            socket_name,
            backend: BackendData::Uninitialized,
            session_active: false,

            config,

            shell: Arc::new(RwLock::new(Shell::new())),
            outputs: Vec::new(),
            pending_windows: Vec::new(),
            popups: PopupManager::default(),
            needs_focus_refresh: false,

            gesture: GestureRecognizer::new((1920.0, 1080.0)),
            touch_slots: HashMap::new(),
            next_touch_slot_id: 0,

            seat,
            seat_state,

            compositor_state,
            xdg_shell_state,
            xdg_decoration_state,
            shm_state,
            data_device_state,
            primary_selection_state,
            xdg_activation_state,
            idle_inhibit_state,
            dmabuf_state,
            layer_shell_state,
            output_configuration_state,
        }
    }

    pub fn session_active(&mut self, active: bool) {
        self.session_active = active;
        if active {
            // resume operations
            if let BackendData::Kms(kms) = &mut self.backend {
                if let Err(err) = kms.libinput.resume() {
                    tracing::error!(?err, "Failed to resume libinput context");
                }
            }
        } else {
            // pause operations
            if let BackendData::Kms(kms) = &self.backend {
                kms.libinput.suspend();
            }
        }
    }

    pub fn process_input_event(&mut self, event: InputEvent<impl smithay::backend::input::InputBackend>) {
        // we'll handle input processing in a later phase
        let _ = event;
    }

    /// The small integer id the gesture recognizer knows `slot` by,
    /// allocating a fresh one on first use.
    pub(crate) fn touch_slot_id(&mut self, slot: TouchSlot) -> i32 {
        if let Some(&id) = self.touch_slots.get(&slot) {
            return id;
        }
        let id = self.next_touch_slot_id;
        self.next_touch_slot_id = self.next_touch_slot_id.wrapping_add(1);
        self.touch_slots.insert(slot, id);
        id
    }

    /// Forget `slot`'s id mapping, e.g. on touch-up.
    pub(crate) fn release_touch_slot(&mut self, slot: TouchSlot) {
        self.touch_slots.remove(&slot);
    }
}
