//! Conversion between store rows and backup records

use cbak_format::constants as col;
use cbak_format::{ContactMethod, Organization, PhoneNumber, Photo, Record, Result};

use crate::store::{ChildKind, ContactStore, RawRow, ID_COLUMN};

/// Assemble a full record from a base row and its children.
pub fn load_record<S: ContactStore + ?Sized>(store: &S, base: &RawRow) -> Result<Record> {
    let mut record = record_from_row(base)?;
    let Some(id) = base.id() else {
        return Ok(record);
    };

    for kind in ChildKind::ALL {
        let rows = store.query_children(id, kind)?;
        match kind {
            ChildKind::ContactMethod => {
                record.contact_methods = rows.iter().map(contact_method_from_row).collect::<Result<_>>()?;
            }
            ChildKind::Phone => {
                record.phone_numbers = rows.iter().map(phone_from_row).collect::<Result<_>>()?;
            }
            ChildKind::Organization => {
                record.organizations = rows.iter().map(organization_from_row).collect::<Result<_>>()?;
            }
            ChildKind::Photo => {
                record.photos = rows
                    .iter()
                    .map(photo_from_row)
                    .filter_map(Result::transpose)
                    .collect::<Result<_>>()?;
            }
        }
    }

    Ok(record)
}

/// Scalar fields of a base row; children are left empty.
pub fn record_from_row(row: &RawRow) -> Result<Record> {
    Ok(Record {
        id: row.integer(ID_COLUMN)?,
        name: row.text(col::NAME)?,
        custom_ring_tone: row.text(col::CUSTOM_RING_TONE)?,
        display_name: row.text(col::DISPLAY_NAME)?,
        last_time_contacted: row.integer(col::LAST_TIME_CONTACTED)?,
        notes: row.text(col::NOTES)?,
        phonetic_name: row.text(col::PHONETIC_NAME)?,
        send_to_voicemail: row.flag(col::SEND_TO_VOICEMAIL)?,
        starred: row.flag(col::STARRED)?,
        times_contacted: row.counter(col::TIMES_CONTACTED)?,
        ..Record::default()
    })
}

/// Base row for inserting `record`. The backup identifier is left out; the
/// destination store assigns its own.
pub fn base_row(record: &Record) -> RawRow {
    RawRow::new()
        .with(col::NAME, record.name.clone())
        .with(col::CUSTOM_RING_TONE, record.custom_ring_tone.clone())
        .with(col::DISPLAY_NAME, record.display_name.clone())
        .with(col::LAST_TIME_CONTACTED, record.last_time_contacted)
        .with(col::NOTES, record.notes.clone())
        .with(col::PHONETIC_NAME, record.phonetic_name.clone())
        .with(col::SEND_TO_VOICEMAIL, record.send_to_voicemail)
        .with(col::STARRED, record.starred)
        .with(col::TIMES_CONTACTED, record.times_contacted)
}

fn primary(row: &RawRow) -> Result<bool> {
    Ok(row.flag(col::IS_PRIMARY)?.unwrap_or(false))
}

/// Contact method from a child row.
pub fn contact_method_from_row(row: &RawRow) -> Result<ContactMethod> {
    Ok(ContactMethod {
        is_primary: primary(row)?,
        label: row.text(col::LABEL)?,
        kind_type: row.text(col::TYPE)?,
        aux_data: row.text(col::AUX_DATA)?,
        data: row.text(col::DATA)?,
        kind: row.text(col::KIND)?,
    })
}

/// Child row for a contact method.
pub fn contact_method_row(method: &ContactMethod) -> RawRow {
    RawRow::new()
        .with(col::IS_PRIMARY, method.is_primary)
        .with(col::LABEL, method.label.clone())
        .with(col::TYPE, method.kind_type.clone())
        .with(col::AUX_DATA, method.aux_data.clone())
        .with(col::DATA, method.data.clone())
        .with(col::KIND, method.kind.clone())
}

/// Phone number from a child row.
pub fn phone_from_row(row: &RawRow) -> Result<PhoneNumber> {
    Ok(PhoneNumber {
        is_primary: primary(row)?,
        label: row.text(col::LABEL)?,
        number: row.text(col::NUMBER)?,
        number_key: row.text(col::NUMBER_KEY)?,
        phone_type: row.text(col::TYPE)?,
    })
}

/// Child row for a phone number.
pub fn phone_row(phone: &PhoneNumber) -> RawRow {
    RawRow::new()
        .with(col::IS_PRIMARY, phone.is_primary)
        .with(col::LABEL, phone.label.clone())
        .with(col::NUMBER, phone.number.clone())
        .with(col::NUMBER_KEY, phone.number_key.clone())
        .with(col::TYPE, phone.phone_type.clone())
}

/// Organization from a child row.
pub fn organization_from_row(row: &RawRow) -> Result<Organization> {
    Ok(Organization {
        is_primary: primary(row)?,
        label: row.text(col::LABEL)?,
        title: row.text(col::TITLE)?,
        company: row.text(col::COMPANY)?,
        org_type: row.text(col::TYPE)?,
    })
}

/// Child row for an organization.
pub fn organization_row(org: &Organization) -> RawRow {
    RawRow::new()
        .with(col::IS_PRIMARY, org.is_primary)
        .with(col::LABEL, org.label.clone())
        .with(col::TITLE, org.title.clone())
        .with(col::COMPANY, org.company.clone())
        .with(col::TYPE, org.org_type.clone())
}

/// Photo from a child row; rows without data yield `None`.
pub fn photo_from_row(row: &RawRow) -> Result<Option<Photo>> {
    Ok(row.blob(col::DATA)?.map(Photo))
}

/// Child row for a photo.
pub fn photo_row(photo: &Photo) -> RawRow {
    RawRow::new().with(col::DATA, photo.bytes().to_vec())
}

/// Insert `record` with all of its children.
///
/// Only the primary photo is stored. Returns the new identifier and the
/// number of children the store refused.
pub fn store_record<S: ContactStore + ?Sized>(store: &mut S, record: &Record) -> crate::StoreResult<(i64, Vec<crate::StoreError>)> {
    let id = store.insert_record(&base_row(record))?;

    let children = record
        .contact_methods
        .iter()
        .map(|m| (ChildKind::ContactMethod, contact_method_row(m)))
        .chain(record.phone_numbers.iter().map(|p| (ChildKind::Phone, phone_row(p))))
        .chain(record.organizations.iter().map(|o| (ChildKind::Organization, organization_row(o))))
        .chain(record.primary_photo().map(|p| (ChildKind::Photo, photo_row(p))));

    let mut refused = Vec::new();
    for (kind, row) in children {
        if let Err(err) = store.insert_child(id, kind, &row) {
            refused.push(err);
        }
    }
    Ok((id, refused))
}
