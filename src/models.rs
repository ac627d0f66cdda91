// Data structures for the marketplace records held by the backend.
// Field names match the backend's snake_case wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Enum stored as a plain string on the wire. Values the backend sends that we
// don't know about are kept in `Other` instead of failing the whole record.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(value) => value.as_str(),
                }
            }

            pub fn parse(value: &str) -> Self {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($wire => Self::$variant,)+
                    _ => Self::Other(value.to_string()),
                }
            }

            /// Case-insensitive comparison, used by the exact-match filters.
            pub fn matches(&self, other: &Self) -> bool {
                self.as_str().eq_ignore_ascii_case(other.as_str())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                Ok(Self::parse(&value))
            }
        }
    };
}

wire_enum!(Condition {
    New => "new",
    Excellent => "excellent",
    Good => "good",
    Fair => "fair",
    Poor => "poor",
});

wire_enum!(SellerType {
    Dealer => "dealer",
    Private => "private",
});

wire_enum!(FuelType {
    Gasoline => "gasoline",
    Hybrid => "hybrid",
    Electric => "electric",
    Diesel => "diesel",
});

wire_enum!(Transmission {
    Automatic => "automatic",
    Manual => "manual",
    Cvt => "cvt",
});

wire_enum!(BodyStyle {
    Sedan => "sedan",
    Suv => "suv",
    Truck => "truck",
    Coupe => "coupe",
    Convertible => "convertible",
    Hatchback => "hatchback",
    Wagon => "wagon",
    Van => "van",
    Minivan => "minivan",
});

wire_enum!(DriveType {
    Fwd => "fwd",
    Rwd => "rwd",
    Awd => "awd",
    FourWd => "4wd",
});

wire_enum!(VehicleStatus {
    Active => "active",
    Pending => "pending",
    Sold => "sold",
    Hidden => "hidden",
});

wire_enum!(PriceFairness {
    ExcellentDeal => "excellent_deal",
    GoodDeal => "good_deal",
    FairPrice => "fair_price",
    Overpriced => "overpriced",
});

wire_enum!(ThreadStatus {
    Active => "active",
    Archived => "archived",
});

wire_enum!(MessageType {
    Text => "text",
    System => "system",
    Offer => "offer",
});

wire_enum!(OfferStatus {
    Pending => "pending",
    Accepted => "accepted",
    Declined => "declined",
});

// Backend timestamps sometimes arrive without an offset ("2025-08-05T20:27:08.123000").
// Those are read as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
        }
    }
}

// Numbers in backend records are loosely typed: null, "", "42,000", 42000.0.
// Anything unreadable becomes the default (or None) rather than failing the record.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub trait FromF64: Sized {
        fn from_f64(value: f64) -> Option<Self>;
    }

    impl FromF64 for f64 {
        fn from_f64(value: f64) -> Option<Self> {
            value.is_finite().then_some(value)
        }
    }

    impl FromF64 for i32 {
        fn from_f64(value: f64) -> Option<Self> {
            let rounded = value.round();
            (rounded >= i32::MIN as f64 && rounded <= i32::MAX as f64).then_some(rounded as i32)
        }
    }

    impl FromF64 for u32 {
        fn from_f64(value: f64) -> Option<Self> {
            let rounded = value.round();
            (rounded >= 0.0 && rounded <= u32::MAX as f64).then_some(rounded as u32)
        }
    }

    fn as_f64(value: Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn option_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromF64,
    {
        Ok(as_f64(Value::deserialize(deserializer)?).and_then(T::from_f64))
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromF64 + Default,
    {
        Ok(option_number(deserializer)?.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
    pub dealer_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarfaxAnalysis {
    pub accidents_reported: Option<u32>,
    pub number_of_owners: Option<u32>,
    pub service_records: Option<u32>,
    pub salvage_title: Option<bool>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiAnalysis {
    pub condition_score: Option<f64>,
    pub price_fairness: Option<PriceFairness>,
    pub market_comparison: Option<f64>,
    pub summary: Option<String>,
    pub image_flags: Vec<String>,
    pub carfax_analysis: Option<CarfaxAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vehicle {
    pub id: String,
    pub title: String,
    pub make: String,
    pub model: String,
    pub trim: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub year: i32,
    #[serde(deserialize_with = "lenient::number")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub mileage: u32,
    pub condition: Option<Condition>,
    pub seller_type: Option<SellerType>,
    pub vin: Option<String>,
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub body_style: Option<BodyStyle>,
    pub drive_type: Option<DriveType>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub doors: Option<u32>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub seating_capacity: Option<u32>,
    pub engine_type: Option<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub efficiency_city: Option<f64>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub efficiency_highway: Option<f64>,
    pub features: Vec<String>,
    pub contact_info: ContactInfo,
    pub images: Vec<String>,
    pub carfax_report_url: Option<String>,
    pub ai_analysis: Option<AiAnalysis>,
    pub ai_tags: Vec<String>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub horsepower: Option<u32>,
    #[serde(deserialize_with = "lenient::option_number")]
    pub zero_to_sixty_time: Option<f64>,
    pub status: Option<VehicleStatus>,
    pub created_by: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub created_date: Option<DateTime<Utc>>,
}

impl Vehicle {
    pub fn is_active(&self) -> bool {
        matches!(self.status, Some(VehicleStatus::Active))
    }

    /// Title shown on cards; falls back to "year make model" for untitled records.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("{} {} {}", self.year, self.make, self.model)
        } else {
            self.title.clone()
        }
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    pub fn condition_score(&self) -> f64 {
        self.ai_analysis
            .as_ref()
            .and_then(|analysis| analysis.condition_score)
            .unwrap_or(0.0)
    }

    /// Lower-cased text the keyword search runs against.
    pub fn search_text(&self) -> String {
        let features = self.features.join(" ");
        let parts = [
            self.title.as_str(),
            self.description.as_deref().unwrap_or(""),
            self.make.as_str(),
            self.model.as_str(),
            self.trim.as_deref().unwrap_or(""),
            features.as_str(),
            self.fuel_type.as_ref().map(FuelType::as_str).unwrap_or(""),
            self.condition.as_ref().map(Condition::as_str).unwrap_or(""),
            self.body_style.as_ref().map(BodyStyle::as_str).unwrap_or(""),
            self.engine_type.as_deref().unwrap_or(""),
        ];
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedListing {
    pub id: String,
    pub user_email: String,
    pub vehicle_id: String,
    pub notes: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub created_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleView {
    pub id: String,
    pub vehicle_id: String,
    // The backend schema names the viewer identifier column "viewer_ip".
    #[serde(rename = "viewer_ip")]
    pub viewer_id: String,
    pub user_email: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageThread {
    pub id: String,
    pub vehicle_id: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub subject: String,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub status: ThreadStatus,
    pub unread_count_buyer: u32,
    pub unread_count_seller: u32,
}

impl Default for MessageThread {
    fn default() -> Self {
        Self {
            id: String::new(),
            vehicle_id: String::new(),
            buyer_email: String::new(),
            seller_email: String::new(),
            subject: String::new(),
            last_message_at: None,
            last_message_preview: None,
            status: ThreadStatus::Active,
            unread_count_buyer: 0,
            unread_count_seller: 0,
        }
    }
}

impl MessageThread {
    pub fn role_of(&self, email: &str) -> Option<ThreadRole> {
        if self.buyer_email == email {
            Some(ThreadRole::Buyer)
        } else if self.seller_email == email {
            Some(ThreadRole::Seller)
        } else {
            None
        }
    }

    /// The other participant, from `email`'s point of view.
    pub fn counterpart(&self, email: &str) -> &str {
        if self.buyer_email == email {
            &self.seller_email
        } else {
            &self.buyer_email
        }
    }

    /// Key identifying the (vehicle, buyer, seller) triple a thread belongs to.
    pub fn key_for(vehicle_id: &str, buyer_email: &str, seller_email: &str) -> String {
        format!("thread:{}:{}:{}", vehicle_id, buyer_email, seller_email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub recipient_email: String,
    pub content: String,
    pub message_type: MessageType,
    pub offer_amount: Option<f64>,
    pub offer_status: Option<OfferStatus>,
    pub is_read: bool,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp::deserialize_option")]
    pub created_date: Option<DateTime<Utc>>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: String::new(),
            thread_id: String::new(),
            sender_email: String::new(),
            recipient_email: String::new(),
            content: String::new(),
            message_type: MessageType::Text,
            offer_amount: None,
            offer_status: None,
            is_read: false,
            read_at: None,
            created_date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub email: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub is_dealer: bool,
    pub dealer_name: Option<String>,
    pub profile_picture_url: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

// Partial profile update; unset fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_dealer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self == &UserPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loosely_typed_numbers_do_not_fail_the_record() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": "v2",
            "status": "active",
            "year": "2018",
            "price": null,
            "mileage": 42000.6,
            "doors": "",
            "seating_capacity": -5,
            "latitude": "30.2672",
            "longitude": "n/a",
            "horsepower": "1,250"
        }))
        .unwrap();

        assert_eq!(vehicle.year, 2018);
        assert_eq!(vehicle.price, 0.0);
        assert_eq!(vehicle.mileage, 42001);
        assert_eq!(vehicle.doors, None);
        assert_eq!(vehicle.seating_capacity, None);
        assert_eq!(vehicle.latitude, Some(30.2672));
        assert_eq!(vehicle.longitude, None);
        assert_eq!(vehicle.horsepower, Some(1250));
        assert!(vehicle.is_active());
    }

    #[test]
    fn unknown_enum_values_are_preserved() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": "v1",
            "body_style": "Crossover",
            "condition": "Excellent",
            "status": "active"
        }))
        .unwrap();

        assert_eq!(vehicle.body_style, Some(BodyStyle::Other("Crossover".into())));
        assert_eq!(vehicle.condition, Some(Condition::Excellent));
        assert!(vehicle.is_active());
        assert_eq!(serde_json::to_value(&vehicle.body_style).unwrap(), json!("Crossover"));
    }

    #[test]
    fn naive_backend_timestamps_parse_as_utc() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "created_date": "2025-08-05T20:27:08.123000"
        }))
        .unwrap();
        let created = message.created_date.unwrap();
        assert_eq!(created.to_rfc3339(), "2025-08-05T20:27:08.123+00:00");
    }

    #[test]
    fn display_title_falls_back_to_year_make_model() {
        let vehicle = Vehicle {
            year: 2019,
            make: "Honda".into(),
            model: "Civic".into(),
            ..Default::default()
        };
        assert_eq!(vehicle.display_title(), "2019 Honda Civic");
    }

    #[test]
    fn thread_counterpart_depends_on_viewer() {
        let thread = MessageThread {
            buyer_email: "buyer@example.com".into(),
            seller_email: "seller@example.com".into(),
            ..Default::default()
        };
        assert_eq!(thread.counterpart("buyer@example.com"), "seller@example.com");
        assert_eq!(thread.counterpart("seller@example.com"), "buyer@example.com");
        assert_eq!(thread.role_of("someone@example.com"), None);
    }
}
