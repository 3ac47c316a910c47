//! Control-parameter XML documents.
//!
//! The documents are small and fixed, so they are coded by-name rather
//! than through an XML object model: a value is found by its surrounding
//! `<{Tag} Name="{name}">` element. Unknown or missing values are caller
//! errors.

use crate::probe::service::EndpointConfig;
use shared::wire::probe::{ProbePointId, ProbePurpose, ProbeState, ProbeType};

pub fn format_service_state(state: ProbeState) -> String {
    format!(
        "<control_parameters>\n    <StringParameter Name=\"State\">{}</StringParameter>\n</control_parameters>\n",
        state.name()
    )
}

pub fn parse_service_state(xml: &str) -> Result<ProbeState, String> {
    let value = tag_value(xml, "StringParameter", "State")
        .ok_or_else(|| "missing StringParameter \"State\"".to_string())?;
    ProbeState::parse(value).ok_or_else(|| format!("unknown service state `{value}`"))
}

pub fn format_endpoint(config: &EndpointConfig) -> String {
    format!(
        concat!(
            "<control_parameters>\n",
            "    <BoolParameter Name=\"Enabled\">{}</BoolParameter>\n",
            "    <ParameterBlock Name=\"ProbePoint\">\n",
            "        <IntegerParameter Name=\"ModuleId\">{}</IntegerParameter>\n",
            "        <IntegerParameter Name=\"InstanceId\">{}</IntegerParameter>\n",
            "        <StringParameter Name=\"Type\">{}</StringParameter>\n",
            "        <IntegerParameter Name=\"Index\">{}</IntegerParameter>\n",
            "    </ParameterBlock>\n",
            "    <StringParameter Name=\"Purpose\">{}</StringParameter>\n",
            "</control_parameters>\n",
        ),
        config.enabled as u8,
        config.point.module_id,
        config.point.instance_id,
        type_name(config.point.ty),
        config.point.index,
        config.purpose.name(),
    )
}

pub fn parse_endpoint(xml: &str) -> Result<EndpointConfig, String> {
    let enabled = match required(xml, "BoolParameter", "Enabled")? {
        "0" => false,
        "1" => true,
        other => return Err(format!("Enabled must be 0 or 1, got `{other}`")),
    };
    let module_id: u16 = parse_number(required(xml, "IntegerParameter", "ModuleId")?, "ModuleId")?;
    let instance_id: u8 =
        parse_number(required(xml, "IntegerParameter", "InstanceId")?, "InstanceId")?;
    let index: u8 = parse_number(required(xml, "IntegerParameter", "Index")?, "Index")?;
    if index >= 64 {
        return Err(format!("Index must be below 64, got {index}"));
    }
    let ty = parse_type(required(xml, "StringParameter", "Type")?)?;
    let purpose_name = required(xml, "StringParameter", "Purpose")?;
    let purpose = ProbePurpose::parse(purpose_name)
        .ok_or_else(|| format!("unknown purpose `{purpose_name}`"))?;

    Ok(EndpointConfig {
        enabled,
        point: ProbePointId::new(module_id, instance_id, ty, index),
        purpose,
    })
}

fn type_name(ty: ProbeType) -> &'static str {
    match ty {
        ProbeType::Input => "Input",
        ProbeType::Output => "Output",
        ProbeType::Internal => "Internal",
    }
}

fn parse_type(name: &str) -> Result<ProbeType, String> {
    match name {
        "Input" => Ok(ProbeType::Input),
        "Output" => Ok(ProbeType::Output),
        "Internal" => Ok(ProbeType::Internal),
        other => Err(format!("unknown probe point type `{other}`")),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{name} is not a valid number: `{value}`"))
}

fn required<'a>(xml: &'a str, tag: &str, name: &str) -> Result<&'a str, String> {
    tag_value(xml, tag, name).ok_or_else(|| format!("missing {tag} \"{name}\""))
}

fn tag_value<'a>(xml: &'a str, tag: &str, name: &str) -> Option<&'a str> {
    let open = format!("<{tag} Name=\"{name}\">");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_state_round_trip() {
        for state in [
            ProbeState::Idle,
            ProbeState::Owned,
            ProbeState::Allocated,
            ProbeState::Active,
        ] {
            assert_eq!(parse_service_state(&format_service_state(state)).unwrap(), state);
        }
    }

    #[test]
    fn endpoint_round_trip() {
        let config = EndpointConfig {
            enabled: true,
            point: ProbePointId::new(1, 2, ProbeType::Output, 0),
            purpose: ProbePurpose::Extract,
        };
        assert_eq!(parse_endpoint(&format_endpoint(&config)).unwrap(), config);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(parse_service_state("<control_parameters/>").is_err());
        assert!(parse_service_state(&format_service_state(ProbeState::Idle).replace("Idle", "Started")).is_err());

        let valid = format_endpoint(&EndpointConfig::default());
        assert!(parse_endpoint(&valid.replace("Input", "Sideways")).is_err());
        assert!(parse_endpoint(&valid.replace('0', "banana")).is_err());
        assert!(parse_endpoint("<control_parameters></control_parameters>").is_err());
    }
}
