//! Maps the provider's place-type taxonomy onto the small set of categories
//! the travel content uses. Unknown vendor types fall back to
//! [`LocationCategory::Attraction`] so ingestion never fails on new types.

use serde::{Deserialize, Serialize};

use self::LocationCategory::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationCategory {
    Culture,
    Food,
    Cafe,
    Nightlife,
    Nature,
    Shopping,
    Wellness,
    Entertainment,
    Stay,
    /// Generic fallback.
    Attraction,
}

impl LocationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationCategory::Culture => "culture",
            LocationCategory::Food => "food",
            LocationCategory::Cafe => "cafe",
            LocationCategory::Nightlife => "nightlife",
            LocationCategory::Nature => "nature",
            LocationCategory::Shopping => "shopping",
            LocationCategory::Wellness => "wellness",
            LocationCategory::Entertainment => "entertainment",
            LocationCategory::Stay => "stay",
            LocationCategory::Attraction => "attraction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMatch {
    pub category: LocationCategory,
    #[serde(default)]
    pub sub_type: Option<String>,
}

impl CategoryMatch {
    fn fallback() -> Self {
        Self {
            category: LocationCategory::Attraction,
            sub_type: None,
        }
    }
}

const TYPE_TABLE: &[(&str, LocationCategory, Option<&str>)] = &[
    // culture
    ("museum", Culture, Some("museum")),
    ("art_gallery", Culture, Some("gallery")),
    ("art_studio", Culture, Some("gallery")),
    ("buddhist_temple", Culture, Some("temple")),
    ("hindu_temple", Culture, Some("temple")),
    ("place_of_worship", Culture, Some("shrine")),
    ("shinto_shrine", Culture, Some("shrine")),
    ("church", Culture, Some("church")),
    ("mosque", Culture, Some("mosque")),
    ("synagogue", Culture, Some("synagogue")),
    ("historical_landmark", Culture, Some("landmark")),
    ("historical_place", Culture, Some("landmark")),
    ("cultural_landmark", Culture, Some("landmark")),
    ("monument", Culture, Some("monument")),
    ("castle", Culture, Some("castle")),
    ("performing_arts_theater", Culture, Some("theater")),
    ("cultural_center", Culture, None),
    ("library", Culture, Some("library")),
    // food
    ("ramen_restaurant", Food, Some("ramen")),
    ("sushi_restaurant", Food, Some("sushi")),
    ("japanese_restaurant", Food, Some("japanese")),
    ("seafood_restaurant", Food, Some("seafood")),
    ("steak_house", Food, Some("steak")),
    ("barbecue_restaurant", Food, Some("barbecue")),
    ("vegan_restaurant", Food, Some("vegan")),
    ("vegetarian_restaurant", Food, Some("vegetarian")),
    ("fine_dining_restaurant", Food, Some("fine_dining")),
    ("food_court", Food, Some("food_court")),
    ("bakery", Food, Some("bakery")),
    ("dessert_shop", Food, Some("dessert")),
    ("ice_cream_shop", Food, Some("dessert")),
    ("fast_food_restaurant", Food, Some("fast_food")),
    ("restaurant", Food, None),
    ("meal_takeaway", Food, None),
    ("food", Food, None),
    // cafes
    ("coffee_shop", Cafe, Some("coffee")),
    ("tea_house", Cafe, Some("tea")),
    ("cafe", Cafe, None),
    // nightlife
    ("bar", Nightlife, Some("bar")),
    ("wine_bar", Nightlife, Some("wine_bar")),
    ("pub", Nightlife, Some("pub")),
    ("night_club", Nightlife, Some("club")),
    ("karaoke", Nightlife, Some("karaoke")),
    // nature
    ("park", Nature, Some("park")),
    ("national_park", Nature, Some("park")),
    ("state_park", Nature, Some("park")),
    ("garden", Nature, Some("garden")),
    ("botanical_garden", Nature, Some("garden")),
    ("hiking_area", Nature, Some("hiking")),
    ("beach", Nature, Some("beach")),
    ("zoo", Nature, Some("zoo")),
    ("aquarium", Nature, Some("aquarium")),
    ("natural_feature", Nature, None),
    // shopping
    ("shopping_mall", Shopping, Some("mall")),
    ("department_store", Shopping, Some("department_store")),
    ("market", Shopping, Some("market")),
    ("book_store", Shopping, Some("books")),
    ("clothing_store", Shopping, Some("fashion")),
    ("gift_shop", Shopping, Some("souvenirs")),
    ("store", Shopping, None),
    // wellness
    ("spa", Wellness, Some("spa")),
    ("public_bath", Wellness, Some("onsen")),
    ("sauna", Wellness, Some("sauna")),
    ("wellness_center", Wellness, None),
    // entertainment
    ("amusement_park", Entertainment, Some("theme_park")),
    ("amusement_center", Entertainment, Some("arcade")),
    ("movie_theater", Entertainment, Some("cinema")),
    ("stadium", Entertainment, Some("stadium")),
    ("bowling_alley", Entertainment, None),
    // stays
    ("ryokan", Stay, Some("ryokan")),
    ("hotel", Stay, Some("hotel")),
    ("hostel", Stay, Some("hostel")),
    ("lodging", Stay, None),
    // generic attractions
    ("tourist_attraction", Attraction, None),
    ("observation_deck", Attraction, Some("viewpoint")),
    ("point_of_interest", Attraction, None),
];

fn lookup(place_type: &str) -> Option<CategoryMatch> {
    let needle = place_type.trim();
    TYPE_TABLE
        .iter()
        .find(|(vendor, _, _)| vendor.eq_ignore_ascii_case(needle))
        .map(|(_, category, sub_type)| CategoryMatch {
            category: *category,
            sub_type: sub_type.map(str::to_string),
        })
}

/// Exact primary-type match first, then the first recognized secondary type
/// in provider order, then the generic fallback.
pub fn map_place_type(primary_type: Option<&str>, types: &[String]) -> CategoryMatch {
    if let Some(found) = primary_type.and_then(lookup) {
        return found;
    }
    types
        .iter()
        .find_map(|place_type| lookup(place_type))
        .unwrap_or_else(CategoryMatch::fallback)
}
