use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, ApiError},
    models::{
        auth::AuthenticatedUser,
        convert::{
            is_valid_day_month, Convert, CreateConvertRequest, ImportReport, ImportRowError,
            UpdateConvertRequest,
        },
        user::Role,
    },
};

pub struct ConvertService;

impl ConvertService {
    /// Leaders see only their own group; pastors and admins see everyone,
    /// optionally narrowed to one group.
    pub async fn list(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        group_filter: Option<Uuid>,
    ) -> Result<Vec<Convert>, ApiError> {
        let scope = match actor.role {
            Role::Leader => actor.group_id,
            _ => group_filter,
        };
        let converts = match scope {
            Some(gid) => {
                sqlx::query_as::<_, Convert>(
                    "SELECT * FROM converts WHERE group_id = $1 ORDER BY last_name, first_name",
                )
                .bind(gid)
                .fetch_all(pool)
                .await?
            }
            None if matches!(actor.role, Role::Leader) => Vec::new(),
            None => {
                sqlx::query_as::<_, Convert>(
                    "SELECT * FROM converts ORDER BY last_name, first_name",
                )
                .fetch_all(pool)
                .await?
            }
        };
        Ok(converts)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Convert, ApiError> {
        sqlx::query_as::<_, Convert>("SELECT * FROM converts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Convert not found".into()))
    }

    pub async fn create(
        pool: &PgPool,
        req: &CreateConvertRequest,
        registered_by: Uuid,
    ) -> Result<Convert, ApiError> {
        validate_registration(req)?;
        let phone = req.phone_number.trim();

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM converts WHERE phone_number = $1)",
        )
        .bind(phone)
        .fetch_one(pool)
        .await?;
        if taken {
            return Err(ApiError::Conflict(format!(
                "Phone number {phone} is already registered"
            )));
        }

        let convert = sqlx::query_as::<_, Convert>(
            "INSERT INTO converts
                (first_name, last_name, phone_number, date_of_birth, gender,
                 residential_location, group_id, registered_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(phone)
        .bind(&req.date_of_birth)
        .bind(&req.gender)
        .bind(&req.residential_location)
        .bind(req.group_id)
        .bind(registered_by)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(format!("Phone number {phone} is already registered"))
            } else {
                e.into()
            }
        })?;
        Ok(convert)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateConvertRequest,
    ) -> Result<Convert, ApiError> {
        if let Some(dob) = &req.date_of_birth {
            if !is_valid_day_month(dob) {
                return Err(ApiError::Validation(
                    "date_of_birth must be DD-MM".into(),
                ));
            }
        }
        if let Some(phone) = &req.phone_number {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM converts WHERE phone_number = $1 AND id <> $2)",
            )
            .bind(phone.trim())
            .bind(id)
            .fetch_one(pool)
            .await?;
            if taken {
                return Err(ApiError::Conflict(format!(
                    "Phone number {} is already registered",
                    phone.trim()
                )));
            }
        }

        let convert = sqlx::query_as::<_, Convert>(
            "UPDATE converts
             SET first_name           = COALESCE($1, first_name),
                 last_name            = COALESCE($2, last_name),
                 phone_number         = COALESCE($3, phone_number),
                 date_of_birth        = COALESCE($4, date_of_birth),
                 gender               = COALESCE($5, gender),
                 residential_location = COALESCE($6, residential_location),
                 group_id             = COALESCE($7, group_id),
                 updated_at           = NOW()
             WHERE id = $8
             RETURNING *",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.phone_number.as_deref().map(str::trim))
        .bind(&req.date_of_birth)
        .bind(&req.gender)
        .bind(&req.residential_location)
        .bind(req.group_id)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Convert not found".into()))?;
        Ok(convert)
    }

    /// Removes the listed converts; progress and attendance rows cascade.
    pub async fn bulk_delete(pool: &PgPool, ids: &[Uuid]) -> Result<u64, ApiError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM converts WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Bulk registration from an uploaded CSV or XLSX sheet. Rows fail
    /// independently; each failure is reported with its row number.
    ///
    /// Expected columns, in order:
    /// first_name, last_name, phone_number, date_of_birth, gender, residential_location
    pub async fn import(
        pool: &PgPool,
        bytes: &[u8],
        filename: &str,
        registered_by: Uuid,
        group_id: Option<Uuid>,
    ) -> Result<ImportReport, ApiError> {
        let rows = if filename.to_lowercase().ends_with(".xlsx") {
            parse_xlsx(bytes)?
        } else {
            parse_csv(bytes)?
        };

        let mut created = 0;
        let mut errors = Vec::new();
        for (i, row) in rows.into_iter().enumerate() {
            // Header rows count from 1 for error reporting.
            let row_number = i + 2;
            let req = match row_to_request(&row, group_id) {
                Ok(req) => req,
                Err(message) => {
                    errors.push(ImportRowError { row: row_number, message });
                    continue;
                }
            };
            match Self::create(pool, &req, registered_by).await {
                Ok(_) => created += 1,
                Err(e) => errors.push(ImportRowError { row: row_number, message: e.to_string() }),
            }
        }
        Ok(ImportReport { created, errors })
    }
}

fn validate_registration(req: &CreateConvertRequest) -> Result<(), ApiError> {
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(ApiError::Validation("First and last name are required".into()));
    }
    if req.phone_number.trim().is_empty() {
        return Err(ApiError::Validation("Phone number is required".into()));
    }
    if let Some(dob) = &req.date_of_birth {
        if !is_valid_day_month(dob) {
            return Err(ApiError::Validation("date_of_birth must be DD-MM".into()));
        }
    }
    Ok(())
}

fn row_to_request(
    row: &[String],
    group_id: Option<Uuid>,
) -> Result<CreateConvertRequest, String> {
    let field = |i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
    let opt = |i: usize| Some(field(i)).filter(|s| !s.is_empty());

    let first_name = field(0);
    let last_name = field(1);
    let phone_number = field(2);
    if first_name.is_empty() || last_name.is_empty() {
        return Err("missing first or last name".into());
    }
    if phone_number.is_empty() {
        return Err("missing phone number".into());
    }
    Ok(CreateConvertRequest {
        first_name,
        last_name,
        phone_number,
        date_of_birth: opt(3),
        gender: opt(4),
        residential_location: opt(5),
        group_id,
    })
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ApiError::Validation(format!("Unreadable CSV: {e}")))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

fn parse_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>, ApiError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ApiError::Validation(format!("Unreadable XLSX file: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ApiError::Validation("XLSX file has no sheets".into()))?
        .map_err(|e| ApiError::Validation(format!("Unreadable XLSX sheet: {e}")))?;

    let rows = range
        .rows()
        .skip(1) // header
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        // Phone columns often come back as floats; strip the ".0".
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_parse_with_quoting() {
        let data = b"first_name,last_name,phone_number,date_of_birth\n\
                     Ama,\"Mensah, Jr\",0244000001,05-03\n\
                     Kofi,Boateng,0244000002,\n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "Mensah, Jr");

        let req = row_to_request(&rows[0], None).unwrap();
        assert_eq!(req.phone_number, "0244000001");
        assert_eq!(req.date_of_birth.as_deref(), Some("05-03"));

        let req = row_to_request(&rows[1], None).unwrap();
        assert_eq!(req.date_of_birth, None);
    }

    #[test]
    fn rows_missing_required_fields_are_rejected() {
        assert!(row_to_request(&["".into(), "X".into(), "024".into()], None).is_err());
        assert!(row_to_request(&["A".into(), "B".into(), "".into()], None).is_err());
    }

    #[test]
    fn numeric_cells_render_without_decimals() {
        assert_eq!(cell_to_string(&Data::Float(244000001.0)), "244000001");
        assert_eq!(cell_to_string(&Data::String(" 024 ".into())), "024");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
