// External work done on a listing draft.

use anyhow::{anyhow, Context};
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{
    state::{ListingForm, ListingWizard},
    validation::validate_for_publish,
    WizardError,
};
use crate::{
    backend::Collection,
    integrations::{invoke_structured, invoke_text, Geocoder, Integrations, LlmRequest, UploadFile},
    models::{
        AiAnalysis, BodyStyle, CarfaxAnalysis, DriveType, FuelType, GeoPoint, PriceFairness, Transmission, Vehicle,
        VehicleStatus,
    },
};

const VIN_LENGTH: usize = 17;
const ANALYZED_IMAGES: usize = 4;
const IMAGE_LABELS: [&str; ANALYZED_IMAGES] = ["Front", "Left Side", "Back", "Right Side"];
const MAX_ENRICHMENT_TAGS: usize = 5;

/// Upper-cases the VIN and drops characters a VIN can't contain (I, O, Q, punctuation).
pub fn normalize_vin(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| (c.is_ascii_uppercase() && !matches!(c, 'I' | 'O' | 'Q')) || c.is_ascii_digit())
        .collect()
}

/// Attributes returned by the VIN decoder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VinDecode {
    pub success: bool,
    pub error_message: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub trim: Option<String>,
    pub engine: Option<String>,
    pub transmission: Option<Transmission>,
    pub fuel_type: Option<FuelType>,
    pub body_style: Option<String>,
    pub drive_type: Option<String>,
    pub doors: Option<u32>,
    pub seating_capacity: Option<u32>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub efficiency_city: Option<f64>,
    pub efficiency_highway: Option<f64>,
}

impl VinDecode {
    fn apply(self, vin: String, form: &mut ListingForm) {
        let defaults = ListingForm::default();
        form.make = self.make.unwrap_or_default();
        form.model = self.model.unwrap_or_default();
        form.year = self.year.filter(|y| *y > 0).unwrap_or(defaults.year);
        form.trim = self.trim.unwrap_or_default();
        form.vin = vin;
        form.fuel_type = self.fuel_type.unwrap_or(defaults.fuel_type);
        form.transmission = self.transmission.unwrap_or(defaults.transmission);
        // "Pickup Truck" -> "pickup-truck"
        form.body_style = self
            .body_style
            .filter(|s| !s.trim().is_empty())
            .map(|s| BodyStyle::parse(&s.to_lowercase().replacen(' ', "-", 1)))
            .unwrap_or(defaults.body_style);
        form.drive_type = self
            .drive_type
            .filter(|s| !s.trim().is_empty())
            .map(|s| DriveType::parse(&s))
            .unwrap_or(defaults.drive_type);
        form.doors = self.doors;
        form.seating_capacity = self.seating_capacity;
        form.engine_type = self.engine.unwrap_or_default();
        form.exterior_color = self.exterior_color.unwrap_or_default();
        form.interior_color = self.interior_color.unwrap_or_default();
        form.efficiency_city = self.efficiency_city;
        form.efficiency_highway = self.efficiency_highway;
        form.description = decoded_description(form);
    }
}

fn decoded_description(form: &ListingForm) -> String {
    let mut heading = format!("This is a {} {} {}", form.year, form.make, form.model);
    if !form.trim.is_empty() {
        heading.push_str(&format!(" ({})", form.trim));
    }
    let mut specs = Vec::new();
    if !form.engine_type.is_empty() {
        specs.push(format!("Engine: {}.", form.engine_type));
    }
    specs.push(format!("Body Style: {}.", form.body_style));
    specs.push(format!("Drive Type: {}.", form.drive_type));

    format!(
        "{}\n{}\n\nVIN decoded automatically. Please verify all information and add additional details \
         about condition, features, and history.",
        heading,
        specs.join(" ")
    )
}

fn vin_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "make": { "type": "string", "description": "Vehicle manufacturer" },
            "model": { "type": "string", "description": "Vehicle model" },
            "year": { "type": "integer", "description": "Model year" },
            "trim": { "type": "string", "description": "Trim level or package" },
            "engine": { "type": "string", "description": "Engine specifications" },
            "transmission": { "type": "string", "enum": ["automatic", "manual", "cvt"] },
            "fuel_type": { "type": "string", "enum": ["gasoline", "hybrid", "electric", "diesel"] },
            "body_style": { "type": "string", "description": "Body style (sedan, SUV, coupe, etc.)" },
            "drive_type": { "type": "string", "enum": ["fwd", "rwd", "awd", "4wd"] },
            "doors": { "type": "integer" },
            "seating_capacity": { "type": "integer" },
            "exterior_color": { "type": "string" },
            "interior_color": { "type": "string" },
            "efficiency_city": { "type": "number", "description": "Estimated city MPG" },
            "efficiency_highway": { "type": "number", "description": "Estimated highway MPG" },
            "success": { "type": "boolean", "description": "Whether VIN decoding was successful" },
            "error_message": { "type": "string", "description": "Error message if decoding failed" }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisUpdate {
    condition_score: Option<f64>,
    price_fairness: Option<PriceFairness>,
    market_comparison: Option<f64>,
    summary: Option<String>,
    image_flags: Option<Vec<String>>,
}

impl AnalysisUpdate {
    // Fields the model returned replace the old ones; Carfax data is kept.
    fn merge_into(self, analysis: &mut AiAnalysis) {
        if self.condition_score.is_some() {
            analysis.condition_score = self.condition_score;
        }
        if self.price_fairness.is_some() {
            analysis.price_fairness = self.price_fairness;
        }
        if self.market_comparison.is_some() {
            analysis.market_comparison = self.market_comparison;
        }
        if self.summary.is_some() {
            analysis.summary = self.summary;
        }
        if let Some(flags) = self.image_flags {
            analysis.image_flags = flags;
        }
    }
}

fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "condition_score": { "type": "number" },
            "price_fairness": {
                "type": "string",
                "enum": ["excellent_deal", "good_deal", "fair_price", "overpriced"]
            },
            "market_comparison": { "type": "number" },
            "summary": { "type": "string" },
            "image_flags": { "type": "array", "items": { "type": "string" } }
        }
    })
}

fn carfax_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "accidents_reported": { "type": "integer", "description": "Number of accidents reported" },
            "service_records": { "type": "integer", "description": "Number of service history records" },
            "number_of_owners": { "type": "integer", "description": "Number of previous owners" },
            "salvage_title": { "type": "boolean", "description": "Whether the vehicle has a salvage title" },
            "summary": { "type": "string", "description": "A brief summary of the vehicle history report." }
        }
    })
}

fn analysis_prompt(wizard: &ListingWizard, analyzed: usize) -> String {
    let form = &wizard.form;
    let mut prompt = format!(
        "Analyze this vehicle and its history:\n\
         1. Overall condition assessment (score 1-10) based on ALL provided images\n\
         2. Any visible damage, wear, or issues from multiple angles\n\
         3. Suggested market price range based on visible condition and history\n\
         4. Key selling points or concerns, incorporating Carfax data\n\n\
         Vehicle details: {} {} {} {}\nListed price: ${}\nMileage: {} miles\n",
        form.year,
        form.make,
        form.model,
        form.trim,
        form.price.map(|p| p.to_string()).unwrap_or_default(),
        form.mileage.map(|m| m.to_string()).unwrap_or_default(),
    );

    if let Some(carfax) = wizard.ai_analysis.as_ref().and_then(|a| a.carfax_analysis.as_ref()) {
        let count = |n: Option<u32>| n.map_or_else(|| "N/A".to_string(), |n| n.to_string());
        prompt.push_str(&format!(
            "\nCarfax History:\n- Accidents: {}\n- Owners: {}\n- Service Records: {}\n- Salvage Title: {}\n- Summary: {}\n",
            count(carfax.accidents_reported),
            count(carfax.number_of_owners),
            count(carfax.service_records),
            if carfax.salvage_title == Some(true) { "Yes" } else { "No" },
            carfax.summary.as_deref().unwrap_or(""),
        ));
    }

    prompt.push_str(&format!("\nYou have {} vehicle images to analyze:\n", analyzed));
    for (index, label) in IMAGE_LABELS.iter().take(analyzed).enumerate() {
        prompt.push_str(&format!("- Image {}: {} view\n", index + 1, label));
    }
    prompt.push_str(
        "Assess overall condition from every angle: damage, scratches, dents, paint, panel alignment and tires.",
    );
    prompt
}

fn title_prompt(form: &ListingForm) -> String {
    let features = if form.features.is_empty() {
        "N/A".to_string()
    } else {
        form.features.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
    };
    format!(
        "Generate a concise, attractive title for a vehicle listing. Include the year, make, model \
         and trim, and highlight 1-2 key features or the condition.\n\n\
         - Year: {}\n- Make: {}\n- Model: {}\n- Trim: {}\n- Condition: {}\n- Mileage: {}\n- Key Features: {}\n\n\
         Examples:\n- 2021 Ford Bronco Sport Big Bend - Low Miles, 4x4\n\
         - 2022 Honda Civic Sport - Excellent Condition, Apple CarPlay\n\n\
         Return only the title text without quotation marks.",
        form.year,
        form.make,
        form.model,
        form.trim,
        form.condition,
        form.mileage.map(|m| m.to_string()).unwrap_or_default(),
        features,
    )
}

/// Drops one pair of surrounding quotes, if any.
fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['"', '\'']).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed);
    trimmed.trim().to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Enrichment {
    horsepower: Option<u32>,
    zero_to_sixty_time: Option<f64>,
    ai_tags: Option<Vec<String>>,
}

impl Enrichment {
    fn into_patch(self) -> Option<Value> {
        let mut patch = Map::new();
        if let Some(hp) = self.horsepower.filter(|hp| *hp > 0) {
            patch.insert("horsepower".into(), json!(hp));
        }
        if let Some(time) = self.zero_to_sixty_time.filter(|t| *t > 0.0) {
            patch.insert("zero_to_sixty_time".into(), json!(time));
        }
        if let Some(tags) = self.ai_tags.filter(|tags| !tags.is_empty()) {
            let tags: Vec<String> = tags.into_iter().take(MAX_ENRICHMENT_TAGS).collect();
            patch.insert("ai_tags".into(), json!(tags));
        }
        if patch.is_empty() { None } else { Some(Value::Object(patch)) }
    }
}

#[derive(Clone)]
pub struct WizardService {
    integrations: Arc<dyn Integrations>,
    geocoder: Arc<dyn Geocoder>,
    vehicles: Collection<Vehicle>,
}

impl WizardService {
    pub fn new(integrations: Arc<dyn Integrations>, geocoder: Arc<dyn Geocoder>, vehicles: Collection<Vehicle>) -> Self {
        Self {
            integrations,
            geocoder,
            vehicles,
        }
    }

    /// Opens an existing vehicle for editing. Only its owner may do so.
    pub async fn load_for_edit(&self, owner: &str, vehicle_id: &str) -> Result<ListingWizard, WizardError> {
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .await?
            .ok_or_else(|| WizardError::VehicleNotFound(vehicle_id.to_string()))?;
        if vehicle.created_by.as_deref() != Some(owner) {
            tracing::warn!(vehicle = vehicle_id, user = owner, "Refused to open someone else's listing");
            return Err(WizardError::NotOwner);
        }
        Ok(ListingWizard::for_vehicle(owner, &vehicle))
    }

    /// Decodes the VIN and fills the basic info. On failure the form is untouched.
    pub async fn decode_vin(&self, wizard: &mut ListingWizard, raw_vin: &str) -> Result<(), WizardError> {
        let vin = normalize_vin(raw_vin);
        if vin.len() != VIN_LENGTH {
            return Err(WizardError::InvalidVin(vin.len()));
        }

        let request = LlmRequest::new(format!(
            "Decode this Vehicle Identification Number (VIN): {}\n\n\
             Provide make, model, year, trim, engine, transmission, fuel type, body style, drive type, \
             doors, seating capacity, exterior and interior color, and estimated city/highway MPG. \
             Use reliable VIN decoding sources.",
            vin
        ))
        .with_schema(vin_schema())
        .with_internet_context();

        let decoded: VinDecode = match invoke_structured(self.integrations.as_ref(), request).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(vin = %vin, "VIN decode call failed: {:?}", e);
                return Err(WizardError::VinDecodeFailed(
                    "VIN decoding failed. Please try again or enter vehicle information manually.".into(),
                ));
            }
        };
        if !decoded.success {
            return Err(WizardError::VinDecodeFailed(decoded.error_message.unwrap_or_else(|| {
                "Unable to decode VIN. Please enter vehicle information manually.".into()
            })));
        }

        decoded.apply(vin.clone(), &mut wizard.form);
        tracing::info!(draft = %wizard.id, vin = %vin, "VIN decoded");

        if let Err(e) = self.generate_title(wizard).await {
            tracing::warn!(draft = %wizard.id, "Title generation after VIN decode failed: {}", e);
        }
        Ok(())
    }

    /// Resets everything a VIN decode fills in, including title and description.
    pub fn clear_vin(&self, wizard: &mut ListingWizard) {
        let defaults = ListingForm::default();
        let form = &mut wizard.form;
        form.make = defaults.make;
        form.model = defaults.model;
        form.year = defaults.year;
        form.trim = defaults.trim;
        form.vin = defaults.vin;
        form.fuel_type = defaults.fuel_type;
        form.transmission = defaults.transmission;
        form.body_style = defaults.body_style;
        form.drive_type = defaults.drive_type;
        form.doors = None;
        form.seating_capacity = None;
        form.engine_type = defaults.engine_type;
        form.exterior_color = defaults.exterior_color;
        form.interior_color = defaults.interior_color;
        form.efficiency_city = None;
        form.efficiency_highway = None;
        form.description = defaults.description;
        form.title = defaults.title;
    }

    pub async fn generate_title(&self, wizard: &mut ListingWizard) -> Result<String, WizardError> {
        if !wizard.form.has_basics() {
            return Err(WizardError::TitleRequiresBasics);
        }
        let text = invoke_text(self.integrations.as_ref(), LlmRequest::new(title_prompt(&wizard.form))).await?;
        let title = clean_title(&text);
        if title.is_empty() {
            return Err(WizardError::Upstream(anyhow!("Model returned an empty title")));
        }
        wizard.form.title = title.clone();
        Ok(title)
    }

    /// Uploads every file concurrently, appends the URLs in input order and re-runs analysis.
    pub async fn upload_images(&self, wizard: &mut ListingWizard, files: Vec<UploadFile>) -> Result<(), WizardError> {
        if files.is_empty() {
            return Ok(());
        }
        let count = files.len();
        let urls = try_join_all(files.into_iter().map(|file| self.integrations.upload_file(file)))
            .await
            .context("Error uploading images")?;
        wizard.images.extend(urls);
        tracing::info!(draft = %wizard.id, uploaded = count, total = wizard.images.len(), "Images uploaded");

        self.analyze(wizard).await;
        Ok(())
    }

    /// Replaces the image order. Leaving an image out removes it.
    pub async fn set_image_order(&self, wizard: &mut ListingWizard, order: Vec<String>) -> Result<(), WizardError> {
        let mut seen = std::collections::HashSet::new();
        let valid = order
            .iter()
            .all(|url| wizard.images.contains(url) && seen.insert(url.as_str()));
        if !valid {
            return Err(WizardError::InvalidImageOrder);
        }
        wizard.images = order;
        self.analyze(wizard).await;
        Ok(())
    }

    /// Condition analysis over the first four images. Failures leave the previous analysis in place.
    /// With no images left, the image-derived analysis is dropped and only Carfax history is kept.
    pub async fn analyze(&self, wizard: &mut ListingWizard) {
        if wizard.images.is_empty() {
            let carfax = wizard.ai_analysis.take().and_then(|analysis| analysis.carfax_analysis);
            wizard.ai_analysis = carfax.map(|carfax| AiAnalysis {
                carfax_analysis: Some(carfax),
                ..Default::default()
            });
            return;
        }
        let analyzed: Vec<String> = wizard.images.iter().take(ANALYZED_IMAGES).cloned().collect();
        let request = LlmRequest::new(analysis_prompt(wizard, analyzed.len()))
            .with_schema(analysis_schema())
            .with_files(analyzed);

        match invoke_structured::<AnalysisUpdate>(self.integrations.as_ref(), request).await {
            Ok(update) => {
                update.merge_into(wizard.ai_analysis.get_or_insert_with(AiAnalysis::default));
                tracing::info!(draft = %wizard.id, "Condition analysis updated");
            }
            Err(e) => tracing::warn!(draft = %wizard.id, "Condition analysis failed: {:?}", e),
        }
    }

    /// Uploads a Carfax PDF, extracts its history and re-runs analysis with it.
    pub async fn ingest_carfax(&self, wizard: &mut ListingWizard, file: UploadFile) -> Result<CarfaxAnalysis, WizardError> {
        let file_url = self.integrations.upload_file(file).await?;
        wizard.carfax_report_url = Some(file_url.clone());

        let extraction = self.integrations.extract_data(&file_url, carfax_schema()).await?;
        if !extraction.is_success() {
            return Err(WizardError::CarfaxExtractionFailed(
                extraction
                    .details
                    .unwrap_or_else(|| "Could not extract data from Carfax report.".into()),
            ));
        }
        let carfax: CarfaxAnalysis = extraction
            .output
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| WizardError::CarfaxExtractionFailed(format!("Unexpected Carfax data: {}", e)))?
            .unwrap_or_default();

        wizard
            .ai_analysis
            .get_or_insert_with(AiAnalysis::default)
            .carfax_analysis = Some(carfax.clone());
        tracing::info!(draft = %wizard.id, "Carfax report extracted");

        self.analyze(wizard).await;
        Ok(carfax)
    }

    // Coordinates already on the draft win; otherwise forward-geocode the location.
    async fn resolve_coordinates(&self, form: &ListingForm) -> Option<GeoPoint> {
        let location = form.location.trim();
        if location.is_empty() {
            return None;
        }
        if let Some(point) = form.coordinates() {
            return Some(point);
        }
        match self.geocoder.geocode(location).await {
            Ok(result) => result.map(|r| r.point),
            Err(e) => {
                tracing::warn!(location, "Failed to geocode listing location: {:?}", e);
                None
            }
        }
    }

    /// Creates (or, when editing, updates) the vehicle with status active.
    pub async fn publish(&self, wizard: &ListingWizard) -> Result<Vehicle, WizardError> {
        validate_for_publish(&wizard.form)?;

        let coordinates = self.resolve_coordinates(&wizard.form).await;
        let mut record = wizard.record(coordinates, Some(VehicleStatus::Active));

        let vehicle = match &wizard.editing {
            Some(id) => self.vehicles.update(id, &record).await?,
            None => {
                record["created_by"] = json!(wizard.owner);
                self.vehicles.create(&record).await?
            }
        };
        tracing::info!(vehicle = %vehicle.id, owner = %wizard.owner, editing = wizard.is_editing(), "Listing published");

        self.spawn_enrichment(vehicle.id.clone(), wizard.form.clone());
        Ok(vehicle)
    }

    /// Saves an edited listing without touching its status.
    pub async fn save_progress(&self, wizard: &ListingWizard) -> Result<Vehicle, WizardError> {
        let id = wizard.editing.as_deref().ok_or(WizardError::NotEditing)?;
        let coordinates = self.resolve_coordinates(&wizard.form).await;
        let record = wizard.record(coordinates, None);
        let vehicle = self.vehicles.update(id, &record).await?;
        tracing::info!(vehicle = %vehicle.id, "Listing progress saved");

        self.spawn_enrichment(vehicle.id.clone(), wizard.form.clone());
        Ok(vehicle)
    }

    /// Researches horsepower, 0-60 and tags, and patches whichever came back.
    /// Returns the applied patch.
    pub async fn enrich(&self, vehicle_id: &str, form: &ListingForm) -> anyhow::Result<Option<Value>> {
        let prompt = format!(
            "Research the vehicle: {} {} {} {}. Provide its typical horsepower, 0-60 mph time, and up to 5 \
             common descriptive tags. Use tags from this list if applicable: sporty, luxury, reliable, \
             family-friendly, off-road, commuter, economical, safe, high-performance, classic.",
            form.year, form.make, form.model, form.trim
        );
        let request = LlmRequest::new(prompt)
            .with_internet_context()
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "horsepower": { "type": "integer", "description": "Engine horsepower" },
                    "zero_to_sixty_time": { "type": "number", "description": "0-60 mph time in seconds" },
                    "ai_tags": { "type": "array", "items": { "type": "string" } }
                }
            }));

        let research: Enrichment = invoke_structured(self.integrations.as_ref(), request).await?;
        let Some(patch) = research.into_patch() else {
            return Ok(None);
        };
        self.vehicles.update(vehicle_id, &patch).await?;
        tracing::info!(vehicle = vehicle_id, ?patch, "Vehicle enriched");
        Ok(Some(patch))
    }

    /// Runs [`enrich`](Self::enrich) in the background; failures are only logged.
    pub fn spawn_enrichment(&self, vehicle_id: String, form: ListingForm) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.enrich(&vehicle_id, &form).await {
                tracing::warn!(vehicle = %vehicle_id, "Background enrichment failed: {:?}", e);
            }
        })
    }
}
