use super::stage::StageDefinition;
use crate::error::{PumpTrackError, TrackResult};
use std::collections::HashSet;

/// Ordered table of stages forming one chain
///
/// The catalog is validated on construction: names are unique, exactly the
/// first stage has no upstream, and every other stage's upstream is the stage
/// immediately before it.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    stages: Vec<StageDefinition>,
}

impl StageCatalog {
    /// Validate and wrap a list of stages
    pub fn new(stages: Vec<StageDefinition>) -> TrackResult<Self> {
        if stages.is_empty() {
            return Err(PumpTrackError::InvalidCatalog(
                "catalog needs at least one stage".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut completion_fields = HashSet::new();
        for (idx, stage) in stages.iter().enumerate() {
            if !names.insert(stage.name.as_str()) {
                return Err(PumpTrackError::InvalidCatalog(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if !completion_fields.insert(stage.completion_field.as_str()) {
                return Err(PumpTrackError::InvalidCatalog(format!(
                    "completion field '{}' is used by more than one stage",
                    stage.completion_field
                )));
            }

            match (idx, stage.upstream.as_deref()) {
                (0, None) => {}
                (0, Some(upstream)) => {
                    return Err(PumpTrackError::InvalidCatalog(format!(
                        "first stage '{}' cannot have upstream '{}'",
                        stage.name, upstream
                    )));
                }
                (_, None) => {
                    return Err(PumpTrackError::InvalidCatalog(format!(
                        "stage '{}' has no upstream",
                        stage.name
                    )));
                }
                (_, Some(upstream)) => {
                    let previous = &stages[idx - 1].name;
                    if upstream != previous {
                        return Err(PumpTrackError::InvalidCatalog(format!(
                            "stage '{}' must follow '{}', found upstream '{}'",
                            stage.name, previous, upstream
                        )));
                    }
                }
            }
        }

        Ok(Self { stages })
    }

    /// The solar pump scheme chain, registration through payment
    pub fn solar_pump() -> Self {
        let stages = solar_pump_stages();
        // The built-in table is a fixed chain that always validates
        Self { stages }
    }

    pub fn get(&self, name: &str) -> TrackResult<&StageDefinition> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PumpTrackError::StageNotFound(name.to_string()))
    }

    pub fn first(&self) -> &StageDefinition {
        &self.stages[0]
    }

    pub fn last(&self) -> &StageDefinition {
        &self.stages[self.stages.len() - 1]
    }

    /// Stage fed by `name`, if any
    pub fn downstream_of(&self, name: &str) -> Option<&StageDefinition> {
        self.stages
            .iter()
            .find(|s| s.upstream.as_deref() == Some(name))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every field a record can carry across the chain, in catalog order
    pub fn all_fields(&self) -> Vec<&str> {
        let mut fields = vec![crate::record::SERIAL_NO_FIELD];
        for stage in &self.stages {
            for field in &stage.contributed_fields {
                if !fields.contains(&field.as_str()) {
                    fields.push(field);
                }
            }
            fields.push(&stage.completion_field);
        }
        fields
    }
}

fn stage(
    name: &str,
    label: &str,
    upstream: Option<&str>,
    fields: &[&str],
    completion_field: &str,
) -> StageDefinition {
    StageDefinition {
        name: name.to_string(),
        label: label.to_string(),
        upstream: upstream.map(str::to_string),
        contributed_fields: fields.iter().map(|f| f.to_string()).collect(),
        completion_field: completion_field.to_string(),
    }
}

fn solar_pump_stages() -> Vec<StageDefinition> {
    vec![
        stage(
            "registration",
            "Registration",
            None,
            &[
                "regId",
                "beneficiaryName",
                "fatherName",
                "village",
                "block",
                "district",
                "mobileNo",
                "pumpCapacity",
            ],
            "registeredAt",
        ),
        stage(
            "work_order",
            "Work Order",
            Some("registration"),
            &["workOrderNo", "workOrderDate", "vendorName"],
            "workOrderAt",
        ),
        stage(
            "sanction",
            "Sanction",
            Some("work_order"),
            &["sanctionNo", "sanctionDate", "sanctionLetterFile"],
            "sanctionAt",
        ),
        stage(
            "foundation",
            "Foundation",
            Some("sanction"),
            &["foundationDate", "foundationPhotoFile", "foundationRemarks"],
            "foundationAt",
        ),
        stage(
            "installation",
            "Installation",
            Some("foundation"),
            &[
                "installationDate",
                "moduleSerialNos",
                "controllerSerialNo",
                "pumpSerialNo",
                "installationPhotoFile",
            ],
            "installationAt",
        ),
        stage(
            "system_info",
            "System Info",
            Some("installation"),
            &[
                "moduleMake",
                "moduleCapacity",
                "controllerMake",
                "pumpMake",
                "structureType",
            ],
            "systemInfoAt",
        ),
        stage(
            "insurance",
            "Insurance",
            Some("system_info"),
            &["insuranceCompany", "policyNo", "policyDate", "insuranceFile"],
            "insuranceAt",
        ),
        stage(
            "jcc_completion",
            "JCC Completion",
            Some("insurance"),
            &["jccNo", "jccDate", "jccFile"],
            "jccCompletionAt",
        ),
        stage(
            "jcc_status",
            "JCC Status",
            Some("jcc_completion"),
            &["jccStatus", "jccRemarks"],
            "jccStatusAt",
        ),
        stage(
            "payment",
            "Payment",
            Some("jcc_status"),
            &[
                "invoiceNo",
                "invoiceAmount",
                "gstAmount",
                "tdsAmount",
                "netPayable",
                "paymentDate",
                "utrNo",
            ],
            "paymentAt",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solar_pump_catalog_is_valid() {
        let catalog = StageCatalog::solar_pump();
        assert!(StageCatalog::new(catalog.iter().cloned().collect()).is_ok());
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.first().name, "registration");
        assert_eq!(catalog.last().name, "payment");
    }

    #[test]
    fn test_lookup_and_neighbours() {
        let catalog = StageCatalog::solar_pump();
        assert_eq!(catalog.get("insurance").unwrap().upstream.as_deref(), Some("system_info"));
        assert_eq!(catalog.downstream_of("insurance").unwrap().name, "jcc_completion");
        assert!(catalog.downstream_of("payment").is_none());
        assert_eq!(catalog.position("sanction"), Some(2));
        assert!(matches!(
            catalog.get("harvest").unwrap_err(),
            PumpTrackError::StageNotFound(_)
        ));
    }

    #[test]
    fn test_all_fields_starts_with_serial() {
        let catalog = StageCatalog::solar_pump();
        let fields = catalog.all_fields();
        assert_eq!(fields[0], "serialNo");
        assert!(fields.contains(&"utrNo"));
        assert!(fields.contains(&"paymentAt"));
    }

    #[test]
    fn test_rejects_out_of_order_upstream() {
        let stages = vec![
            stage("a", "A", None, &[], "aAt"),
            stage("b", "B", Some("a"), &[], "bAt"),
            stage("c", "C", Some("a"), &[], "cAt"),
        ];
        assert!(matches!(
            StageCatalog::new(stages).unwrap_err(),
            PumpTrackError::InvalidCatalog(_)
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let stages = vec![
            stage("a", "A", None, &[], "aAt"),
            stage("a", "A", Some("a"), &[], "bAt"),
        ];
        assert!(StageCatalog::new(stages).is_err());

        let stages = vec![
            stage("a", "A", None, &[], "doneAt"),
            stage("b", "B", Some("a"), &[], "doneAt"),
        ];
        assert!(StageCatalog::new(stages).is_err());
    }

    #[test]
    fn test_rejects_rooted_second_stage() {
        let stages = vec![
            stage("a", "A", None, &[], "aAt"),
            stage("b", "B", None, &[], "bAt"),
        ];
        assert!(StageCatalog::new(stages).is_err());
        assert!(StageCatalog::new(Vec::new()).is_err());
    }
}
