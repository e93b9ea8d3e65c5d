use crate::error::Result;
use crate::notify::Notification;

/// SDK levels the service branches on.
pub mod sdk {
    pub const LOLLIPOP_MR1: u32 = 22;
    pub const M: u32 = 23;
    pub const O_MR1: u32 = 27;
    pub const P: u32 = 28;
    pub const Q: u32 = 29;
    pub const TIRAMISU: u32 = 33;
    pub const UPSIDE_DOWN_CAKE: u32 = 34;
}

/// Everything the service needs from the device.
pub trait Platform: Send + Sync {
    fn sdk_int(&self) -> u32;

    fn permission_granted(&self, permission: &str) -> Result<bool>;
    fn grant_permission(&self, permission: &str) -> Result<()>;
    fn can_draw_overlays(&self) -> Result<bool>;
    fn grant_overlay(&self) -> Result<()>;
    fn is_ignoring_battery_optimizations(&self) -> Result<bool>;
    fn disable_battery_optimization(&self) -> Result<()>;

    fn place_call(&self, number: &str) -> Result<()>;
    /// Ends the current call through telecom.
    fn end_call(&self) -> Result<()>;
    /// Ends the current call through the pre-P telephony binder.
    fn end_call_legacy(&self) -> Result<()>;

    fn wake_screen(&self) -> Result<()>;
    fn set_stay_awake(&self, on: bool) -> Result<()>;
    fn is_device_locked(&self) -> Result<bool>;
    fn is_keyguard_locked(&self) -> Result<bool>;
    fn dismiss_keyguard(&self) -> Result<()>;
    fn disable_keyguard(&self) -> Result<()>;

    fn post_notification(&self, notification: &Notification) -> Result<()>;
}
