// Listing draft: the form, its images and analysis, and the step it is on.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::WizardError;
use crate::models::{
    AiAnalysis, BodyStyle, Condition, ContactInfo, DriveType, FuelType, GeoPoint, SellerType, Transmission,
    Vehicle, VehicleStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    BasicInfo,
    ImagesAi,
    Contact,
    Preview,
}

impl WizardStep {
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::BasicInfo => 1,
            WizardStep::ImagesAi => 2,
            WizardStep::Contact => 3,
            WizardStep::Preview => 4,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::BasicInfo => "Basic Info",
            WizardStep::ImagesAi => "Images & AI",
            WizardStep::Contact => "Contact",
            WizardStep::Preview => "Preview",
        }
    }

    fn following(&self) -> Option<WizardStep> {
        match self {
            WizardStep::BasicInfo => Some(WizardStep::ImagesAi),
            WizardStep::ImagesAi => Some(WizardStep::Contact),
            WizardStep::Contact => Some(WizardStep::Preview),
            WizardStep::Preview => None,
        }
    }

    fn preceding(&self) -> Option<WizardStep> {
        match self {
            WizardStep::BasicInfo => None,
            WizardStep::ImagesAi => Some(WizardStep::BasicInfo),
            WizardStep::Contact => Some(WizardStep::ImagesAi),
            WizardStep::Preview => Some(WizardStep::Contact),
        }
    }
}

fn current_year() -> i32 {
    Utc::now().year()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingForm {
    pub title: String,
    pub make: String,
    pub model: String,
    pub trim: String,
    pub year: i32,
    pub price: Option<f64>,
    pub mileage: Option<u32>,
    pub condition: Condition,
    pub seller_type: SellerType,
    pub vin: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: String,
    pub fuel_type: FuelType,
    pub transmission: Transmission,
    pub body_style: BodyStyle,
    pub drive_type: DriveType,
    pub doors: Option<u32>,
    pub seating_capacity: Option<u32>,
    pub engine_type: String,
    pub exterior_color: String,
    pub interior_color: String,
    pub efficiency_city: Option<f64>,
    pub efficiency_highway: Option<f64>,
    pub features: Vec<String>,
    pub contact_info: ContactInfo,
}

impl Default for ListingForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            make: String::new(),
            model: String::new(),
            trim: String::new(),
            year: current_year(),
            price: None,
            mileage: None,
            condition: Condition::Good,
            seller_type: SellerType::Private,
            vin: String::new(),
            location: String::new(),
            latitude: None,
            longitude: None,
            description: String::new(),
            fuel_type: FuelType::Gasoline,
            transmission: Transmission::Automatic,
            body_style: BodyStyle::Sedan,
            drive_type: DriveType::Fwd,
            doors: None,
            seating_capacity: None,
            engine_type: String::new(),
            exterior_color: String::new(),
            interior_color: String::new(),
            efficiency_city: None,
            efficiency_highway: None,
            features: Vec::new(),
            contact_info: ContactInfo::default(),
        }
    }
}

impl ListingForm {
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        let defaults = Self::default();
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            title: vehicle.title.clone(),
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            trim: text(&vehicle.trim),
            year: if vehicle.year > 0 { vehicle.year } else { defaults.year },
            price: Some(vehicle.price).filter(|p| *p > 0.0),
            mileage: Some(vehicle.mileage).filter(|m| *m > 0),
            condition: vehicle.condition.clone().unwrap_or(defaults.condition),
            seller_type: vehicle.seller_type.clone().unwrap_or(defaults.seller_type),
            vin: text(&vehicle.vin),
            location: text(&vehicle.location),
            latitude: vehicle.latitude,
            longitude: vehicle.longitude,
            description: text(&vehicle.description),
            fuel_type: vehicle.fuel_type.clone().unwrap_or(defaults.fuel_type),
            transmission: vehicle.transmission.clone().unwrap_or(defaults.transmission),
            body_style: vehicle.body_style.clone().unwrap_or(defaults.body_style),
            drive_type: vehicle.drive_type.clone().unwrap_or(defaults.drive_type),
            doors: vehicle.doors,
            seating_capacity: vehicle.seating_capacity,
            engine_type: text(&vehicle.engine_type),
            exterior_color: text(&vehicle.exterior_color),
            interior_color: text(&vehicle.interior_color),
            efficiency_city: vehicle.efficiency_city,
            efficiency_highway: vehicle.efficiency_highway,
            features: vehicle.features.clone(),
            contact_info: vehicle.contact_info.clone(),
        }
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    pub fn has_basics(&self) -> bool {
        !self.make.trim().is_empty() && !self.model.trim().is_empty() && self.year > 0
    }
}

/// Partial form update sent by the client. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormPatch {
    pub title: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub mileage: Option<u32>,
    pub condition: Option<Condition>,
    pub seller_type: Option<SellerType>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    pub fuel_type: Option<FuelType>,
    pub transmission: Option<Transmission>,
    pub body_style: Option<BodyStyle>,
    pub drive_type: Option<DriveType>,
    pub doors: Option<u32>,
    pub seating_capacity: Option<u32>,
    pub engine_type: Option<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub efficiency_city: Option<f64>,
    pub efficiency_highway: Option<f64>,
    pub features: Option<Vec<String>>,
    pub contact_info: Option<ContactInfo>,
}

macro_rules! apply_fields {
    ($patch:ident, $form:ident, [$($field:ident),+ $(,)?], [$($optional:ident),* $(,)?]) => {
        $(if let Some(value) = $patch.$field { $form.$field = value; })+
        $(if $patch.$optional.is_some() { $form.$optional = $patch.$optional; })*
    };
}

impl FormPatch {
    pub fn apply(self, form: &mut ListingForm) {
        // A typed location invalidates coordinates picked for the old one.
        if self.location.is_some() && self.latitude.is_none() {
            form.latitude = None;
            form.longitude = None;
        }
        let patch = self;
        apply_fields!(
            patch,
            form,
            [
                title, make, model, trim, year, condition, seller_type, location, description, fuel_type,
                transmission, body_style, drive_type, engine_type, exterior_color, interior_color, features,
                contact_info,
            ],
            [
                price, mileage, latitude, longitude, doors, seating_capacity, efficiency_city,
                efficiency_highway,
            ]
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingWizard {
    pub id: Uuid,
    pub owner: String,
    /// Id of the vehicle being edited; `None` for a new listing.
    pub editing: Option<String>,
    pub step: WizardStep,
    pub form: ListingForm,
    pub images: Vec<String>,
    pub carfax_report_url: Option<String>,
    pub ai_analysis: Option<AiAnalysis>,
}

impl ListingWizard {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            editing: None,
            step: WizardStep::BasicInfo,
            form: ListingForm::default(),
            images: Vec::new(),
            carfax_report_url: None,
            ai_analysis: None,
        }
    }

    pub fn for_vehicle(owner: impl Into<String>, vehicle: &Vehicle) -> Self {
        Self {
            editing: Some(vehicle.id.clone()),
            form: ListingForm::from_vehicle(vehicle),
            images: vehicle.images.clone(),
            carfax_report_url: vehicle.carfax_report_url.clone(),
            ai_analysis: vehicle.ai_analysis.clone(),
            ..Self::new(owner)
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        self.step = self.step.following().ok_or(WizardError::NoNextStep)?;
        Ok(self.step)
    }

    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        self.step = self.step.preceding().ok_or(WizardError::NoPreviousStep)?;
        Ok(self.step)
    }

    /// Jumps straight to a step. Only allowed while editing an existing listing.
    pub fn go_to(&mut self, step: WizardStep) -> Result<WizardStep, WizardError> {
        if !self.is_editing() {
            return Err(WizardError::StepJumpNotAllowed);
        }
        self.step = step;
        Ok(self.step)
    }

    /// The vehicle record to create or update. Empty strings are left out.
    pub fn record(&self, coordinates: Option<GeoPoint>, status: Option<VehicleStatus>) -> Value {
        let form = &self.form;
        let mut record = json!({
            "title": form.title.trim(),
            "make": form.make,
            "model": form.model,
            "trim": form.trim,
            "year": form.year,
            "price": form.price.unwrap_or(0.0),
            "mileage": form.mileage.unwrap_or(0),
            "condition": form.condition,
            "seller_type": form.seller_type,
            "vin": form.vin,
            "location": form.location,
            "latitude": coordinates.map(|p| p.lat),
            "longitude": coordinates.map(|p| p.lng),
            "description": form.description,
            "fuel_type": form.fuel_type,
            "transmission": form.transmission,
            "body_style": form.body_style,
            "drive_type": form.drive_type,
            "doors": form.doors,
            "seating_capacity": form.seating_capacity,
            "engine_type": form.engine_type,
            "exterior_color": form.exterior_color,
            "interior_color": form.interior_color,
            "efficiency_city": form.efficiency_city,
            "efficiency_highway": form.efficiency_highway,
            "features": form.features,
            "contact_info": form.contact_info,
            "images": self.images,
            "carfax_report_url": self.carfax_report_url,
            "ai_analysis": self.ai_analysis,
        });
        if let Some(status) = status {
            record["status"] = json!(status);
        }
        if let Value::Object(fields) = &mut record {
            strip_empty_strings(fields);
        }
        record
    }
}

fn strip_empty_strings(fields: &mut Map<String, Value>) {
    fields.retain(|_, value| !matches!(value, Value::String(s) if s.is_empty()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_navigation() {
        let mut wizard = ListingWizard::new("seller@example.com");
        assert!(matches!(wizard.back(), Err(WizardError::NoPreviousStep)));
        assert_eq!(wizard.next().ok(), Some(WizardStep::ImagesAi));
        assert_eq!(wizard.next().ok(), Some(WizardStep::Contact));
        assert_eq!(wizard.next().ok(), Some(WizardStep::Preview));
        assert!(matches!(wizard.next(), Err(WizardError::NoNextStep)));
        assert_eq!(wizard.back().ok(), Some(WizardStep::Contact));
        assert!(matches!(
            wizard.go_to(WizardStep::BasicInfo),
            Err(WizardError::StepJumpNotAllowed)
        ));
        assert_eq!(wizard.step, WizardStep::Contact);
    }

    #[test]
    fn editing_allows_jumps() {
        let vehicle = Vehicle {
            id: "v1".into(),
            make: "Honda".into(),
            model: "Civic".into(),
            year: 2019,
            price: 18500.0,
            ..Default::default()
        };
        let mut wizard = ListingWizard::for_vehicle("seller@example.com", &vehicle);
        assert_eq!(wizard.go_to(WizardStep::Preview).ok(), Some(WizardStep::Preview));
        assert_eq!(wizard.form.price, Some(18500.0));
        assert_eq!(wizard.form.condition, Condition::Good);
    }

    #[test]
    fn typed_location_drops_stale_coordinates() {
        let mut form = ListingForm {
            location: "Austin, TX".into(),
            latitude: Some(30.27),
            longitude: Some(-97.74),
            ..Default::default()
        };
        FormPatch {
            location: Some("Dallas, TX".into()),
            ..Default::default()
        }
        .apply(&mut form);
        assert_eq!(form.location, "Dallas, TX");
        assert_eq!(form.coordinates(), None);
    }

    #[test]
    fn record_skips_empty_strings_and_sets_status() {
        let mut wizard = ListingWizard::new("seller@example.com");
        wizard.form.title = "2019 Honda Civic".into();
        let record = wizard.record(None, Some(VehicleStatus::Active));
        assert_eq!(record["status"], "active");
        assert_eq!(record["title"], "2019 Honda Civic");
        assert!(record.get("vin").is_none());
        assert_eq!(record["latitude"], Value::Null);
        assert_eq!(record["body_style"], "sedan");
    }
}
