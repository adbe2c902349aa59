use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use sdds_dtype::SddsType;
use sdds_error::{SddsError, SddsResult, sdds_bail, sdds_err};

/// The four kinds of definition a layout holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    /// One scalar per page.
    Parameter,
    /// One multi-dimensional value per page.
    Array,
    /// One value per row.
    Column,
    /// A reference to a related file.
    Associate,
}

impl DefinitionKind {
    /// The header keyword introducing definitions of this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            DefinitionKind::Parameter => "parameter",
            DefinitionKind::Array => "array",
            DefinitionKind::Column => "column",
            DefinitionKind::Associate => "associate",
        }
    }
}

impl Display for DefinitionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

impl FromStr for DefinitionKind {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parameter" => Ok(DefinitionKind::Parameter),
            "array" => Ok(DefinitionKind::Array),
            "column" => Ok(DefinitionKind::Column),
            "associate" => Ok(DefinitionKind::Associate),
            _ => sdds_bail!("unknown definition kind \"{}\"", s),
        }
    }
}

/// A named attribute of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoField {
    /// The definition's name.
    Name,
    /// Display symbol.
    Symbol,
    /// Units, an opaque string.
    Units,
    /// Free text.
    Description,
    /// printf-style format hint.
    FormatString,
    /// Value type.
    Type,
    /// Fixed text width of ASCII values.
    FieldLength,
    /// Header literal of a fixed-value parameter.
    FixedValue,
    /// Group of an array.
    GroupName,
    /// Dimensionality of an array.
    Dimensions,
    /// File referenced by an associate.
    Filename,
    /// Directory of an associate's file.
    Path,
    /// Contents of an associate's file.
    Contents,
    /// Whether an associate's file is itself an SDDS file.
    Sdds,
}

impl InfoField {
    /// The header attribute spelling.
    pub fn attribute(self) -> &'static str {
        match self {
            InfoField::Name => "name",
            InfoField::Symbol => "symbol",
            InfoField::Units => "units",
            InfoField::Description => "description",
            InfoField::FormatString => "format_string",
            InfoField::Type => "type",
            InfoField::FieldLength => "field_length",
            InfoField::FixedValue => "fixed_value",
            InfoField::GroupName => "group_name",
            InfoField::Dimensions => "dimensions",
            InfoField::Filename => "filename",
            InfoField::Path => "path",
            InfoField::Contents => "contents",
            InfoField::Sdds => "sdds",
        }
    }

    /// Fields that may change after the layout is published.
    pub fn is_metadata(self) -> bool {
        matches!(
            self,
            InfoField::Symbol
                | InfoField::Units
                | InfoField::Description
                | InfoField::FormatString
                | InfoField::Type
        )
    }
}

impl FromStr for InfoField {
    type Err = SddsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "name" => InfoField::Name,
            "symbol" => InfoField::Symbol,
            "units" => InfoField::Units,
            "description" => InfoField::Description,
            "format_string" | "format" => InfoField::FormatString,
            "type" => InfoField::Type,
            "field_length" => InfoField::FieldLength,
            "fixed_value" => InfoField::FixedValue,
            "group_name" => InfoField::GroupName,
            "dimensions" => InfoField::Dimensions,
            "filename" => InfoField::Filename,
            "path" => InfoField::Path,
            "contents" => InfoField::Contents,
            "sdds" => InfoField::Sdds,
            _ => sdds_bail!(NotFound: "unknown definition field \"{}\"", s),
        })
    }
}

/// Behaviour shared by the four definition kinds.
pub trait Definition: Clone + Debug + Eq {
    /// The kind of this definition.
    const KIND: DefinitionKind;

    /// A definition with an empty name and default attributes, to be filled from header fields.
    fn blank() -> Self;

    /// The definition's name.
    fn name(&self) -> &str;

    /// The value type; `None` for associates.
    fn sdds_type(&self) -> Option<SddsType>;

    /// Read an attribute as text. Fails with `NotFound` if this kind has no such attribute.
    fn info(&self, field: InfoField) -> SddsResult<Option<String>>;

    /// Write an attribute from text. Fails with `NotFound` if this kind has no such attribute.
    fn set_info(&mut self, field: InfoField, value: &str) -> SddsResult<()>;

    /// The attributes written to a header, in order.
    fn header_fields(&self) -> Vec<(InfoField, String)>;

    /// Check the invariants of a complete definition.
    fn validate(&self) -> SddsResult<()> {
        validate_name(self.name())
    }

    /// Build a definition from header attributes.
    fn from_fields<'a, I>(fields: I) -> SddsResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut def = Self::blank();
        for (key, value) in fields {
            let field = key.parse::<InfoField>().map_err(|e| {
                e.with_context(format!("in &{} definition", Self::KIND.keyword()))
            })?;
            def.set_info(field, value)?;
        }
        def.validate()?;
        Ok(def)
    }
}

/// Names must be non-empty and free of whitespace, quotes and commas.
pub fn validate_name(name: &str) -> SddsResult<()> {
    if name.is_empty() {
        sdds_bail!("definition name is empty");
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | ',' | '&' | '='))
    {
        sdds_bail!("definition name \"{}\" contains invalid characters", name);
    }
    Ok(())
}

fn opt(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_int(field: InfoField, value: &str) -> SddsResult<i32> {
    value
        .trim()
        .parse()
        .map_err(|_| sdds_err!("{} must be an integer, not \"{}\"", field.attribute(), value))
}

fn no_such_field(kind: DefinitionKind, field: InfoField) -> SddsError {
    sdds_err!(NotFound: "{} definitions have no field \"{}\"", kind, field.attribute())
}

fn push_opt(out: &mut Vec<(InfoField, String)>, field: InfoField, value: &Option<String>) {
    if let Some(v) = value {
        out.push((field, v.clone()));
    }
}

macro_rules! builder {
    ($($field:ident),*) => {
        $(
            #[doc = concat!("Set `", stringify!($field), "`.")]
            pub fn $field(mut self, value: impl Into<String>) -> Self {
                self.$field = opt(&value.into());
                self
            }
        )*
    };
}

/// Definition of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    /// Name, unique among parameters.
    pub name: String,
    /// Value type.
    pub sdds_type: SddsType,
    /// Display symbol.
    pub symbol: Option<String>,
    /// Units.
    pub units: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// printf-style format hint.
    pub format_string: Option<String>,
    /// When present the value is taken from this literal and not written in page data.
    pub fixed_value: Option<String>,
}

impl ParameterDefinition {
    /// A parameter with only a name and type.
    pub fn new(name: impl Into<String>, sdds_type: SddsType) -> Self {
        Self {
            name: name.into(),
            sdds_type,
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            fixed_value: None,
        }
    }

    builder!(symbol, units, description, format_string, fixed_value);
}

impl Definition for ParameterDefinition {
    const KIND: DefinitionKind = DefinitionKind::Parameter;

    fn blank() -> Self {
        Self::new("", SddsType::Double)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sdds_type(&self) -> Option<SddsType> {
        Some(self.sdds_type)
    }

    fn info(&self, field: InfoField) -> SddsResult<Option<String>> {
        Ok(match field {
            InfoField::Name => Some(self.name.clone()),
            InfoField::Type => Some(self.sdds_type.name().to_string()),
            InfoField::Symbol => self.symbol.clone(),
            InfoField::Units => self.units.clone(),
            InfoField::Description => self.description.clone(),
            InfoField::FormatString => self.format_string.clone(),
            InfoField::FixedValue => self.fixed_value.clone(),
            other => return Err(no_such_field(Self::KIND, other)),
        })
    }

    fn set_info(&mut self, field: InfoField, value: &str) -> SddsResult<()> {
        match field {
            InfoField::Name => self.name = value.to_string(),
            InfoField::Type => self.sdds_type = SddsType::parse_name(value)?,
            InfoField::Symbol => self.symbol = opt(value),
            InfoField::Units => self.units = opt(value),
            InfoField::Description => self.description = opt(value),
            InfoField::FormatString => self.format_string = opt(value),
            // An empty fixed value is still a fixed value for string parameters.
            InfoField::FixedValue => self.fixed_value = Some(value.to_string()),
            other => return Err(no_such_field(Self::KIND, other)),
        }
        Ok(())
    }

    fn header_fields(&self) -> Vec<(InfoField, String)> {
        let mut out = vec![(InfoField::Name, self.name.clone())];
        push_opt(&mut out, InfoField::Symbol, &self.symbol);
        push_opt(&mut out, InfoField::Units, &self.units);
        push_opt(&mut out, InfoField::Description, &self.description);
        push_opt(&mut out, InfoField::FormatString, &self.format_string);
        out.push((InfoField::Type, self.sdds_type.name().to_string()));
        push_opt(&mut out, InfoField::FixedValue, &self.fixed_value);
        out
    }
}

/// Definition of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Name, unique among columns.
    pub name: String,
    /// Value type.
    pub sdds_type: SddsType,
    /// Display symbol.
    pub symbol: Option<String>,
    /// Units.
    pub units: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// printf-style format hint.
    pub format_string: Option<String>,
    /// Fixed text width of ASCII values; 0 for free format.
    pub field_length: i32,
}

impl ColumnDefinition {
    /// A column with only a name and type.
    pub fn new(name: impl Into<String>, sdds_type: SddsType) -> Self {
        Self {
            name: name.into(),
            sdds_type,
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            field_length: 0,
        }
    }

    builder!(symbol, units, description, format_string);
}

impl Definition for ColumnDefinition {
    const KIND: DefinitionKind = DefinitionKind::Column;

    fn blank() -> Self {
        Self::new("", SddsType::Double)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sdds_type(&self) -> Option<SddsType> {
        Some(self.sdds_type)
    }

    fn info(&self, field: InfoField) -> SddsResult<Option<String>> {
        Ok(match field {
            InfoField::Name => Some(self.name.clone()),
            InfoField::Type => Some(self.sdds_type.name().to_string()),
            InfoField::Symbol => self.symbol.clone(),
            InfoField::Units => self.units.clone(),
            InfoField::Description => self.description.clone(),
            InfoField::FormatString => self.format_string.clone(),
            InfoField::FieldLength => Some(self.field_length.to_string()),
            other => return Err(no_such_field(Self::KIND, other)),
        })
    }

    fn set_info(&mut self, field: InfoField, value: &str) -> SddsResult<()> {
        match field {
            InfoField::Name => self.name = value.to_string(),
            InfoField::Type => self.sdds_type = SddsType::parse_name(value)?,
            InfoField::Symbol => self.symbol = opt(value),
            InfoField::Units => self.units = opt(value),
            InfoField::Description => self.description = opt(value),
            InfoField::FormatString => self.format_string = opt(value),
            InfoField::FieldLength => self.field_length = parse_int(field, value)?,
            other => return Err(no_such_field(Self::KIND, other)),
        }
        Ok(())
    }

    fn header_fields(&self) -> Vec<(InfoField, String)> {
        let mut out = vec![(InfoField::Name, self.name.clone())];
        push_opt(&mut out, InfoField::Symbol, &self.symbol);
        push_opt(&mut out, InfoField::Units, &self.units);
        push_opt(&mut out, InfoField::Description, &self.description);
        push_opt(&mut out, InfoField::FormatString, &self.format_string);
        out.push((InfoField::Type, self.sdds_type.name().to_string()));
        if self.field_length != 0 {
            out.push((InfoField::FieldLength, self.field_length.to_string()));
        }
        out
    }
}

/// Definition of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDefinition {
    /// Name, unique among arrays.
    pub name: String,
    /// Element type.
    pub sdds_type: SddsType,
    /// Display symbol.
    pub symbol: Option<String>,
    /// Units.
    pub units: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// printf-style format hint.
    pub format_string: Option<String>,
    /// Arrays sharing a group name are related.
    pub group_name: Option<String>,
    /// Fixed text width of ASCII values; 0 for free format.
    pub field_length: i32,
    /// Number of dimensions, at least 1.
    pub dimensions: usize,
}

impl ArrayDefinition {
    /// An array with a name, element type and dimensionality.
    pub fn new(name: impl Into<String>, sdds_type: SddsType, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            sdds_type,
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            group_name: None,
            field_length: 0,
            dimensions,
        }
    }

    builder!(symbol, units, description, format_string, group_name);
}

impl Definition for ArrayDefinition {
    const KIND: DefinitionKind = DefinitionKind::Array;

    fn blank() -> Self {
        Self::new("", SddsType::Double, 1)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sdds_type(&self) -> Option<SddsType> {
        Some(self.sdds_type)
    }

    fn info(&self, field: InfoField) -> SddsResult<Option<String>> {
        Ok(match field {
            InfoField::Name => Some(self.name.clone()),
            InfoField::Type => Some(self.sdds_type.name().to_string()),
            InfoField::Symbol => self.symbol.clone(),
            InfoField::Units => self.units.clone(),
            InfoField::Description => self.description.clone(),
            InfoField::FormatString => self.format_string.clone(),
            InfoField::GroupName => self.group_name.clone(),
            InfoField::FieldLength => Some(self.field_length.to_string()),
            InfoField::Dimensions => Some(self.dimensions.to_string()),
            other => return Err(no_such_field(Self::KIND, other)),
        })
    }

    fn set_info(&mut self, field: InfoField, value: &str) -> SddsResult<()> {
        match field {
            InfoField::Name => self.name = value.to_string(),
            InfoField::Type => self.sdds_type = SddsType::parse_name(value)?,
            InfoField::Symbol => self.symbol = opt(value),
            InfoField::Units => self.units = opt(value),
            InfoField::Description => self.description = opt(value),
            InfoField::FormatString => self.format_string = opt(value),
            InfoField::GroupName => self.group_name = opt(value),
            InfoField::FieldLength => self.field_length = parse_int(field, value)?,
            InfoField::Dimensions => {
                let d = parse_int(field, value)?;
                self.dimensions = usize::try_from(d)
                    .map_err(|_| sdds_err!(ValueOutOfRange: "array dimensions {} invalid", d))?;
            }
            other => return Err(no_such_field(Self::KIND, other)),
        }
        Ok(())
    }

    fn header_fields(&self) -> Vec<(InfoField, String)> {
        let mut out = vec![(InfoField::Name, self.name.clone())];
        push_opt(&mut out, InfoField::Symbol, &self.symbol);
        push_opt(&mut out, InfoField::Units, &self.units);
        push_opt(&mut out, InfoField::Description, &self.description);
        push_opt(&mut out, InfoField::FormatString, &self.format_string);
        push_opt(&mut out, InfoField::GroupName, &self.group_name);
        out.push((InfoField::Type, self.sdds_type.name().to_string()));
        if self.field_length != 0 {
            out.push((InfoField::FieldLength, self.field_length.to_string()));
        }
        out.push((InfoField::Dimensions, self.dimensions.to_string()));
        out
    }

    fn validate(&self) -> SddsResult<()> {
        validate_name(&self.name)?;
        if self.dimensions == 0 {
            sdds_bail!(ValueOutOfRange: "array {} must have at least one dimension", self.name);
        }
        Ok(())
    }
}

/// Definition of an associated file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociateDefinition {
    /// Name, unique among associates.
    pub name: String,
    /// File name.
    pub filename: Option<String>,
    /// Directory of the file.
    pub path: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// Contents of the file.
    pub contents: Option<String>,
    /// Whether the file is itself an SDDS file.
    pub sdds: bool,
}

impl AssociateDefinition {
    /// An associate with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    builder!(filename, path, description, contents);
}

impl Definition for AssociateDefinition {
    const KIND: DefinitionKind = DefinitionKind::Associate;

    fn blank() -> Self {
        Self::default()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sdds_type(&self) -> Option<SddsType> {
        None
    }

    fn info(&self, field: InfoField) -> SddsResult<Option<String>> {
        Ok(match field {
            InfoField::Name => Some(self.name.clone()),
            InfoField::Filename => self.filename.clone(),
            InfoField::Path => self.path.clone(),
            InfoField::Description => self.description.clone(),
            InfoField::Contents => self.contents.clone(),
            InfoField::Sdds => Some(i32::from(self.sdds).to_string()),
            other => return Err(no_such_field(Self::KIND, other)),
        })
    }

    fn set_info(&mut self, field: InfoField, value: &str) -> SddsResult<()> {
        match field {
            InfoField::Name => self.name = value.to_string(),
            InfoField::Filename => self.filename = opt(value),
            InfoField::Path => self.path = opt(value),
            InfoField::Description => self.description = opt(value),
            InfoField::Contents => self.contents = opt(value),
            InfoField::Sdds => self.sdds = parse_int(field, value)? != 0,
            other => return Err(no_such_field(Self::KIND, other)),
        }
        Ok(())
    }

    fn header_fields(&self) -> Vec<(InfoField, String)> {
        let mut out = vec![(InfoField::Name, self.name.clone())];
        push_opt(&mut out, InfoField::Filename, &self.filename);
        push_opt(&mut out, InfoField::Path, &self.path);
        push_opt(&mut out, InfoField::Description, &self.description);
        push_opt(&mut out, InfoField::Contents, &self.contents);
        out.push((InfoField::Sdds, i32::from(self.sdds).to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn column_from_fields() {
        let def = ColumnDefinition::from_fields([
            ("name", "x"),
            ("type", "double"),
            ("units", "m"),
            ("field_length", "10"),
        ])
        .unwrap();
        assert_eq!(
            def,
            ColumnDefinition {
                field_length: 10,
                ..ColumnDefinition::new("x", SddsType::Double).units("m")
            }
        );
    }

    #[rstest]
    #[case(vec![("name", "x"), ("type", "quad")], ErrorKind::InvalidType)]
    #[case(vec![("name", "x"), ("group_name", "g")], ErrorKind::NotFound)]
    #[case(vec![("type", "long")], ErrorKind::InvalidArgument)]
    #[case(vec![("name", "a b")], ErrorKind::InvalidArgument)]
    fn column_field_errors(#[case] fields: Vec<(&str, &str)>, #[case] kind: ErrorKind) {
        assert_eq!(
            ColumnDefinition::from_fields(fields).unwrap_err().kind(),
            kind
        );
    }

    #[test]
    fn array_needs_dimensions() {
        let err = ArrayDefinition::from_fields([("name", "a"), ("dimensions", "0")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueOutOfRange);
    }

    #[test]
    fn parameter_header_fields_in_order() {
        let def = ParameterDefinition::new("p", SddsType::String)
            .units("s")
            .fixed_value("hello");
        let names: Vec<&str> = def
            .header_fields()
            .iter()
            .map(|(f, _)| f.attribute())
            .collect();
        assert_eq!(names, vec!["name", "units", "type", "fixed_value"]);
    }

    #[test]
    fn associate_info() {
        let mut def = AssociateDefinition::new("a").filename("f.sdds");
        def.set_info(InfoField::Sdds, "1").unwrap();
        assert_eq!(def.info(InfoField::Sdds).unwrap().as_deref(), Some("1"));
        assert!(def.info(InfoField::Units).is_err());
    }
}
