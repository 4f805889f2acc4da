pub mod admin;
pub mod collaborator;
pub mod driver;
pub mod offer;
pub mod ride;
pub mod ws;

pub use collaborator::{
    CalendarEntryRequest, CalendarEntryResponse, NotificationEnvelope, NotificationPayload,
};
pub use driver::{
    AccessibilityFeature, DayOfWeek, DriverProfileRequest, DriverProfileResponse, GeoPoint,
    GoOnlineRequest, HeartbeatRequest, ParseEnumError, PresenceResponse, VehicleClass,
    WorkingSlot,
};
pub use offer::{
    AcceptOfferResponse, AssignmentResponse, DeclineOfferRequest, DeclineOfferResponse,
    OfferResponse, OfferState,
};
pub use ride::{
    CancelRideResponse, CreateRideRequest, CreateRideResponse, DispatchSummary, RideKind,
    RideResponse, RideStatus,
};
