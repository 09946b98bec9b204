use crate::core::{PageLimits, PageRequest, ProfileFilter, ProfileOrdering, ProfileUpdate};
use crate::models::{FamilyStatus, FamilyType, Gender};
use crate::services::store::{AccountChanges, GroupChanges, NewGroup, NewPermission, PermissionChanges, ProfileChanges};
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Distinguish an absent key (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// E.164: a plus sign, then 7 to 15 digits without a leading zero
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let valid = phone
        .strip_prefix('+')
        .filter(|digits| (7..=15).contains(&digits.len()))
        .filter(|digits| digits.chars().all(|c| c.is_ascii_digit()))
        .is_some_and(|digits| !digits.starts_with('0'));

    if valid {
        Ok(())
    } else {
        Err(invalid("phone_number", "Enter a valid phone number."))
    }
}

fn validate_measurement(field: &'static str, value: Option<Option<f64>>) -> Result<(), ValidationError> {
    match value.flatten() {
        Some(v) if !(0.0..1000.0).contains(&v) => Err(invalid(
            field,
            format!("Ensure {} is between 0 and 999.99.", field),
        )),
        _ => Ok(()),
    }
}

fn validate_profile_fields(req: &ProfileFieldsRequest) -> Result<(), ValidationError> {
    validate_measurement("height", req.height)?;
    validate_measurement("weight", req.weight)?;
    if let Some(Some(siblings)) = req.siblings {
        if siblings < 0 {
            return Err(invalid("siblings", "Ensure siblings is greater than or equal to 0."));
        }
    }
    if let Some(Some(photo)) = &req.photo {
        if photo.len() > 500 {
            return Err(invalid("photo", "Ensure photo has at most 500 characters."));
        }
    }
    Ok(())
}

fn parse_choice<T: FromStr<Err = String>>(value: &str) -> Result<T, ValidationError> {
    value.parse().map_err(|message| invalid("invalid_choice", message))
}

/// Blank or null choice fields clear the stored value
fn parse_optional_choice<T: FromStr<Err = String>>(
    value: Option<Option<String>>,
) -> Result<Option<Option<T>>, ValidationError> {
    match value {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(s)) if s.is_empty() => Ok(Some(None)),
        Some(Some(s)) => parse_choice(&s).map(|v| Some(Some(v))),
    }
}

fn round2(value: Option<Option<f64>>) -> Option<Option<f64>> {
    value.map(|v| v.map(|x| (x * 100.0).round() / 100.0))
}

/// Profile attributes a client may write
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_profile_fields"))]
pub struct ProfileFieldsRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub photo: Option<Option<String>>,
    pub gender: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub height: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub weight: Option<Option<f64>>,
    #[validate(length(max = 255))]
    pub address_line1: Option<String>,
    #[validate(length(max = 255))]
    pub address_line2: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 255))]
    pub father_name: Option<String>,
    #[validate(length(max = 255))]
    pub mother_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub siblings: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub family_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub family_status: Option<Option<String>>,
    pub bio: Option<String>,
}

impl ProfileFieldsRequest {
    /// Convert into store changes, rejecting unknown choice values
    pub fn into_changes(self) -> Result<ProfileChanges, ValidationError> {
        Ok(ProfileChanges {
            photo: self.photo,
            gender: self.gender.as_deref().map(parse_choice::<Gender>).transpose()?,
            phone_number: self.phone_number,
            height: round2(self.height),
            weight: round2(self.weight),
            address_line1: self.address_line1,
            address_line2: self.address_line2,
            city: self.city,
            state: self.state,
            country: self.country,
            postal_code: self.postal_code,
            father_name: self.father_name,
            mother_name: self.mother_name,
            siblings: self.siblings,
            family_type: parse_optional_choice::<FamilyType>(self.family_type)?,
            family_status: parse_optional_choice::<FamilyStatus>(self.family_status)?,
            bio: self.bio,
        })
    }
}

/// Body of `update_me`: account names and email plus profile attributes.
/// Any other key is ignored.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    pub profile: ProfileFieldsRequest,
}

impl UpdateMeRequest {
    pub fn into_update(self) -> Result<ProfileUpdate, ValidationError> {
        Ok(ProfileUpdate {
            account: AccountChanges {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                ..Default::default()
            },
            profile: self.profile.into_changes()?,
        })
    }
}

/// Body of `POST /api/profiles/register`; every key is required
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterProfileRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone_number: Option<String>,
    pub gender: Option<String>,
}

impl RegisterProfileRequest {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("email", self.email.is_none()),
            ("password", self.password.is_none()),
            ("first_name", self.first_name.is_none()),
            ("last_name", self.last_name.is_none()),
            ("phone_number", self.phone_number.is_none()),
            ("gender", self.gender.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

/// Body of `POST /api/auth/register`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterAccountRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "Ensure this field has at least 8 characters."))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub email: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    #[validate(length(min = 8, message = "Ensure this field has at least 8 characters."))]
    pub new_password: String,
}

/// Body of `PUT /api/auth/profile`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AccountProfileRequest {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
}

impl AccountProfileRequest {
    pub fn into_changes(self) -> AccountChanges {
        AccountChanges {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleInterestRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub profile_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Accepts `42` or `"42"`; a blank string counts as absent
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(id)) => Ok(Some(id)),
        Some(NumberOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {:?}", text))),
    }
}

/// Admin create/update of an account
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    #[serde(alias = "group_ids")]
    pub groups: Option<Vec<i64>>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupIdsRequest {
    pub group_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GroupRequest {
    #[validate(length(min = 1, max = 150))]
    pub name: Option<String>,
    pub permissions: Option<Vec<i64>>,
}

impl GroupRequest {
    pub fn into_new(self) -> Option<NewGroup> {
        Some(NewGroup {
            name: self.name?,
            permission_ids: self.permissions.unwrap_or_default(),
        })
    }

    pub fn into_changes(self) -> GroupChanges {
        GroupChanges {
            name: self.name,
            permission_ids: self.permissions,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PermissionRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub codename: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub content_type: Option<String>,
}

impl PermissionRequest {
    pub fn into_new(self) -> Option<NewPermission> {
        Some(NewPermission {
            name: self.name?,
            codename: self.codename?,
            content_type: self.content_type?,
        })
    }

    pub fn into_changes(self) -> PermissionChanges {
        PermissionChanges {
            name: self.name,
            codename: self.codename,
            content_type: self.content_type,
        }
    }
}

/// `page` and `page_size` query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl PageQuery {
    /// `None` when `page` is not a positive number. An unparsable page size
    /// falls back to the default.
    pub fn to_request(&self, limits: &PageLimits) -> Option<PageRequest> {
        let page = match self.page.as_deref() {
            None => None,
            Some(p) => Some(p.trim().parse::<u64>().ok().filter(|p| *p >= 1)?),
        };
        let page_size = self.page_size.as_deref().and_then(|s| s.trim().parse().ok());
        Some(PageRequest::new(page, page_size, limits))
    }
}

/// Narrowing filters of `GET /api/profiles`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileListQuery {
    pub gender: Option<String>,
    pub city: Option<String>,
    #[serde(rename = "city__icontains")]
    pub city_contains: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "state__icontains")]
    pub state_contains: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "country__icontains")]
    pub country_contains: Option<String>,
    pub family_type: Option<String>,
    pub family_status: Option<String>,
    #[serde(rename = "height__gte")]
    pub height_min: Option<f64>,
    #[serde(rename = "height__lte")]
    pub height_max: Option<f64>,
    #[serde(rename = "weight__gte")]
    pub weight_min: Option<f64>,
    #[serde(rename = "weight__lte")]
    pub weight_max: Option<f64>,
    pub siblings: Option<i32>,
    #[serde(rename = "siblings__gte")]
    pub siblings_min: Option<i32>,
    #[serde(rename = "siblings__lte")]
    pub siblings_max: Option<i32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Empty query values mean "no filter"
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ProfileListQuery {
    pub fn into_filter(self) -> Result<ProfileFilter, ValidationError> {
        Ok(ProfileFilter {
            gender: non_empty(self.gender).as_deref().map(parse_choice::<Gender>).transpose()?,
            city: non_empty(self.city),
            city_contains: non_empty(self.city_contains),
            state: non_empty(self.state),
            state_contains: non_empty(self.state_contains),
            country: non_empty(self.country),
            country_contains: non_empty(self.country_contains),
            family_type: non_empty(self.family_type)
                .as_deref()
                .map(parse_choice::<FamilyType>)
                .transpose()?,
            family_status: non_empty(self.family_status)
                .as_deref()
                .map(parse_choice::<FamilyStatus>)
                .transpose()?,
            height_min: self.height_min,
            height_max: self.height_max,
            weight_min: self.weight_min,
            weight_max: self.weight_max,
            siblings: self.siblings,
            siblings_min: self.siblings_min,
            siblings_max: self.siblings_max,
            search: non_empty(self.search),
            // Unknown ordering fields are ignored
            ordering: self
                .ordering
                .as_deref()
                .and_then(ProfileOrdering::parse)
                .unwrap_or_default(),
        })
    }
}
