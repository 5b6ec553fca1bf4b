//! X.509 Distinguished Name encoding for [`SubjectName`]

use const_oid::ObjectIdentifier;
use der::{
    asn1::{Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef},
    Any, Tag, Tagged,
};
use x509_cert::{
    attr::AttributeTypeAndValue,
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

use super::subject::SubjectName;
use crate::error::{PkiError, Result};

const CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

#[derive(Clone, Copy)]
enum StringKind {
    Utf8,
    Printable,
    Ia5,
}

/// Build an X.509 Name, one RDN per attribute (CN, O, OU, C, ST, L, E).
pub fn build_name(subject: &SubjectName) -> Result<Name> {
    if subject.common_name.is_empty() {
        return Err(PkiError::invalid_subject("common_name", "must not be empty"));
    }

    let mut rdns = vec![rdn(CN, &subject.common_name, StringKind::Utf8)?];
    let optional = [
        (O, &subject.organization, StringKind::Utf8),
        (OU, &subject.organizational_unit, StringKind::Utf8),
        (C, &subject.country, StringKind::Printable),
        (ST, &subject.state, StringKind::Utf8),
        (L, &subject.locality, StringKind::Utf8),
        (EMAIL, &subject.email, StringKind::Ia5),
    ];
    for (oid, value, kind) in optional {
        if let Some(value) = value {
            rdns.push(rdn(oid, value, kind)?);
        }
    }

    Ok(RdnSequence(rdns))
}

fn rdn(oid: ObjectIdentifier, value: &str, kind: StringKind) -> Result<RelativeDistinguishedName> {
    let value = match kind {
        StringKind::Utf8 => Any::encode_from(&Utf8StringRef::new(value)?)?,
        StringKind::Printable => Any::encode_from(&PrintableStringRef::new(value)?)?,
        StringKind::Ia5 => Any::encode_from(&Ia5StringRef::new(value)?)?,
    };
    let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])?;
    Ok(RelativeDistinguishedName(set))
}

/// Parse an X.509 Name back into a [`SubjectName`].
///
/// Unknown attributes are ignored; a missing CN is an error.
pub fn parse_name(name: &Name) -> Result<SubjectName> {
    let mut subject = SubjectName::default();

    for rdn in name.0.iter() {
        for attr in rdn.0.iter() {
            let Some(value) = attribute_string(&attr.value) else {
                continue;
            };

            if attr.oid == CN {
                subject.common_name = value;
            } else if attr.oid == O {
                subject.organization = Some(value);
            } else if attr.oid == OU {
                subject.organizational_unit = Some(value);
            } else if attr.oid == C {
                subject.country = Some(value);
            } else if attr.oid == ST {
                subject.state = Some(value);
            } else if attr.oid == L {
                subject.locality = Some(value);
            } else if attr.oid == EMAIL {
                subject.email = Some(value);
            }
        }
    }

    if subject.common_name.is_empty() {
        return Err(PkiError::InvalidRequest(
            "distinguished name missing required CN".to_string(),
        ));
    }

    Ok(subject)
}

fn attribute_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    }
}
