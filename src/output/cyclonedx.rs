//! CycloneDX SBOM (Software Bill of Materials) output format.
//!
//! Generates a CycloneDX 1.5 document, encoded as JSON or XML.
//! See: https://cyclonedx.org/

use crate::model::{Dependency, DependencyType, ScanResult, ANY_VERSION};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use uuid::Uuid;

const SPEC_VERSION: &str = "1.5";
const XML_NAMESPACE: &str = "http://cyclonedx.org/schema/bom/1.5";

/// CycloneDX SBOM root document
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CycloneDxBom {
    bom_format: &'static str,
    spec_version: &'static str,
    serial_number: String,
    version: u32,
    metadata: CycloneDxMetadata,
    components: Vec<CycloneDxComponent>,
}

#[derive(Serialize)]
struct CycloneDxMetadata {
    timestamp: String,
    tools: Vec<CycloneDxTool>,
    component: CycloneDxComponent,
}

#[derive(Serialize)]
struct CycloneDxTool {
    vendor: &'static str,
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CycloneDxComponent {
    #[serde(rename = "type")]
    component_type: &'static str,
    #[serde(rename = "bom-ref")]
    bom_ref: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    licenses: Vec<CycloneDxLicense>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purl: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    external_references: Vec<CycloneDxExternalRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    properties: Vec<CycloneDxProperty>,
}

#[derive(Serialize)]
struct CycloneDxLicense {
    license: CycloneDxLicenseChoice,
}

/// SPDX identifiers go in `id`; free-form license text goes in `name`.
#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CycloneDxLicenseChoice {
    Id(String),
    Name(String),
}

#[derive(Serialize)]
struct CycloneDxExternalRef {
    #[serde(rename = "type")]
    ref_type: &'static str,
    url: String,
}

#[derive(Serialize)]
struct CycloneDxProperty {
    name: &'static str,
    value: String,
}

fn scope(dependency_type: DependencyType) -> &'static str {
    match dependency_type {
        DependencyType::Direct | DependencyType::Transitive => "required",
        DependencyType::Development => "optional",
    }
}

fn license_choice(license: &str) -> CycloneDxLicenseChoice {
    if license.chars().any(char::is_whitespace) {
        CycloneDxLicenseChoice::Name(license.to_string())
    } else {
        CycloneDxLicenseChoice::Id(license.to_string())
    }
}

fn build_component(dep: &Dependency, bom_ref: String, purl: String) -> CycloneDxComponent {
    let metadata = dep.metadata();

    let mut properties = vec![
        CycloneDxProperty {
            name: "sbomscan:ecosystem",
            value: dep.ecosystem().as_str().to_string(),
        },
        CycloneDxProperty {
            name: "sbomscan:dependency_type",
            value: dep.dependency_type().as_str().to_string(),
        },
    ];
    if let Some(source) = dep.source_file() {
        properties.push(CycloneDxProperty {
            name: "sbomscan:source_file",
            value: source.to_string_lossy().replace('\\', "/"),
        });
    }
    properties.push(CycloneDxProperty {
        name: "sbomscan:confidence",
        value: format!("{:.2}", dep.confidence()),
    });

    CycloneDxComponent {
        component_type: "library",
        bom_ref,
        name: dep.name().to_string(),
        version: (dep.version() != ANY_VERSION).then(|| dep.version().to_string()),
        description: metadata.description.clone(),
        scope: Some(scope(dep.dependency_type())),
        licenses: metadata
            .license
            .iter()
            .map(|license| CycloneDxLicense {
                license: license_choice(license),
            })
            .collect(),
        purl: Some(purl),
        external_references: metadata
            .homepage
            .iter()
            .map(|url| CycloneDxExternalRef {
                ref_type: "website",
                url: url.clone(),
            })
            .collect(),
        properties,
    }
}

fn build_bom(result: &ScanResult) -> CycloneDxBom {
    // Maven and Gradle share a purl scheme, so do CMake and Mbed
    let mut used_refs = HashSet::new();
    let components = result
        .dependencies()
        .map(|dep| {
            let purl = dep.purl();
            let mut bom_ref = purl.clone();
            if !used_refs.insert(bom_ref.clone()) {
                bom_ref = format!("{}#{}", purl, dep.ecosystem().as_str());
                let mut n = 2;
                while !used_refs.insert(bom_ref.clone()) {
                    bom_ref = format!("{}#{}-{}", purl, dep.ecosystem().as_str(), n);
                    n += 1;
                }
            }
            build_component(dep, bom_ref, purl)
        })
        .collect();

    CycloneDxBom {
        bom_format: "CycloneDX",
        spec_version: SPEC_VERSION,
        serial_number: format!("urn:uuid:{}", Uuid::new_v4()),
        version: 1,
        metadata: CycloneDxMetadata {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            tools: vec![CycloneDxTool {
                vendor: "sbomscan",
                name: "sbomscan",
                version: env!("CARGO_PKG_VERSION"),
            }],
            component: CycloneDxComponent {
                component_type: "application",
                bom_ref: format!("{}@{}", result.project_name, result.project_version),
                name: result.project_name.clone(),
                version: Some(result.project_version.clone()),
                description: None,
                scope: None,
                licenses: Vec::new(),
                purl: None,
                external_references: Vec::new(),
                properties: Vec::new(),
            },
        },
        components,
    }
}

/// Generate a CycloneDX JSON document
pub fn generate_json(result: &ScanResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&build_bom(result))?)
}

/// Generate a CycloneDX XML document
pub fn generate_xml(result: &ScanResult) -> Result<String> {
    let bom = build_bom(result);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let version = bom.version.to_string();
    start(
        &mut writer,
        "bom",
        &[
            ("xmlns", XML_NAMESPACE),
            ("serialNumber", bom.serial_number.as_str()),
            ("version", version.as_str()),
        ],
    )?;

    start(&mut writer, "metadata", &[])?;
    text_element(&mut writer, "timestamp", &bom.metadata.timestamp)?;
    start(&mut writer, "tools", &[])?;
    for tool in &bom.metadata.tools {
        start(&mut writer, "tool", &[])?;
        text_element(&mut writer, "vendor", tool.vendor)?;
        text_element(&mut writer, "name", tool.name)?;
        text_element(&mut writer, "version", tool.version)?;
        end(&mut writer, "tool")?;
    }
    end(&mut writer, "tools")?;
    write_component(&mut writer, &bom.metadata.component)?;
    end(&mut writer, "metadata")?;

    start(&mut writer, "components", &[])?;
    for component in &bom.components {
        write_component(&mut writer, component)?;
    }
    end(&mut writer, "components")?;

    end(&mut writer, "bom")?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Children follow the order of the 1.5 XML schema.
fn write_component<W: Write>(writer: &mut Writer<W>, component: &CycloneDxComponent) -> Result<()> {
    start(
        writer,
        "component",
        &[
            ("type", component.component_type),
            ("bom-ref", component.bom_ref.as_str()),
        ],
    )?;

    text_element(writer, "name", &component.name)?;
    if let Some(version) = &component.version {
        text_element(writer, "version", version)?;
    }
    if let Some(description) = &component.description {
        text_element(writer, "description", description)?;
    }
    if let Some(scope) = component.scope {
        text_element(writer, "scope", scope)?;
    }

    if !component.licenses.is_empty() {
        start(writer, "licenses", &[])?;
        for license in &component.licenses {
            start(writer, "license", &[])?;
            match &license.license {
                CycloneDxLicenseChoice::Id(id) => text_element(writer, "id", id)?,
                CycloneDxLicenseChoice::Name(name) => text_element(writer, "name", name)?,
            }
            end(writer, "license")?;
        }
        end(writer, "licenses")?;
    }

    if let Some(purl) = &component.purl {
        text_element(writer, "purl", purl)?;
    }

    if !component.external_references.is_empty() {
        start(writer, "externalReferences", &[])?;
        for reference in &component.external_references {
            start(writer, "reference", &[("type", reference.ref_type)])?;
            text_element(writer, "url", &reference.url)?;
            end(writer, "reference")?;
        }
        end(writer, "externalReferences")?;
    }

    if !component.properties.is_empty() {
        start(writer, "properties", &[])?;
        for property in &component.properties {
            start(writer, "property", &[("name", property.name)])?;
            writer.write_event(Event::Text(BytesText::new(&property.value)))?;
            end(writer, "property")?;
        }
        end(writer, "properties")?;
    }

    end(writer, "component")
}

fn start<W: Write>(writer: &mut Writer<W>, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    let mut element = BytesStart::new(name);
    for attribute in attributes {
        element.push_attribute(*attribute);
    }
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn end<W: Write>(writer: &mut Writer<W>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    start(writer, name, &[])?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}
