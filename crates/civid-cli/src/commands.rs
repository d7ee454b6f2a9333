//! Command execution and exit-code policy.
//!
//! Exit codes: 0 = success, 2 = validation error, 3 = unregistered
//! identity, 4 = duplicate identity or record, 5 = record not found or
//! nothing to update, 6 = access denied, 7 = storage failure.

use anyhow::{Context, Result};

use civid_core::config::ServiceConfig;
use civid_core::domain::{HealthAttribute, HealthPatch, HealthRecord, PersonId};
use civid_service::records::RecordError;
use civid_service::registry::RegistryError;
use civid_service::{CivIdService, Disclosure};

use crate::Commands;

const EXIT_SUCCESS: u8 = 0;
const EXIT_VALIDATION: u8 = 2;
const EXIT_UNREGISTERED: u8 = 3;
const EXIT_DUPLICATE: u8 = 4;
const EXIT_NOT_FOUND: u8 = 5;
const EXIT_DENIED: u8 = 6;
const EXIT_STORAGE: u8 = 7;

/// Opens the service and runs one command, returning its exit code.
///
/// # Errors
///
/// Returns an error only for setup failures (service open); operation
/// failures are reported on stderr and mapped to exit codes.
pub(crate) fn run(config: &ServiceConfig, command: Commands) -> Result<u8> {
    let service = CivIdService::open(config).context("failed to open service")?;

    let code = match command {
        Commands::Init => {
            println!(
                "initialized database {} and audit directory {}",
                config.database_path.display(),
                config.audit_dir.display(),
            );
            EXIT_SUCCESS
        },

        Commands::Register { name } => match service.register(&name) {
            Ok(id) => {
                println!("registered {name} with id {id}");
                EXIT_SUCCESS
            },
            Err(err) => {
                eprintln!("registration failed: {err}");
                registry_exit_code(&err)
            },
        },

        Commands::Insert {
            id,
            doctor,
            asthma,
            disability,
        } => {
            let record = HealthRecord::new(PersonId::new(id), doctor, asthma, disability);
            match service.insert(&record) {
                Ok(()) => {
                    println!("inserted health record for id {id}");
                    EXIT_SUCCESS
                },
                Err(err) => {
                    eprintln!("insert failed: {err}");
                    record_exit_code(&err)
                },
            }
        },

        Commands::Update {
            id,
            doctor,
            asthma,
            disability,
            updated_by,
        } => {
            let patch = HealthPatch {
                registered_doctor: doctor,
                has_asthma: asthma,
                has_registered_disability: disability,
            };
            match service.update(&updated_by, PersonId::new(id), &patch) {
                Ok(()) => {
                    println!("updated health record for id {id}");
                    EXIT_SUCCESS
                },
                Err(err) => {
                    eprintln!("update failed: {err}");
                    record_exit_code(&err)
                },
            }
        },

        Commands::Query {
            requester,
            password,
            attribute,
            id,
        } => match attribute.parse::<HealthAttribute>() {
            Ok(attribute) => disclose(&service, &requester, &password, attribute, id),
            Err(err) => {
                eprintln!("query failed: {err}");
                EXIT_VALIDATION
            },
        },

        Commands::CheckDisability {
            requester,
            password,
            id,
        } => disclose(
            &service,
            &requester,
            &password,
            HealthAttribute::HasRegisteredDisability,
            id,
        ),

        Commands::SeedCredential { name, password } => {
            match service.seed_credential(&name, &password) {
                Ok(()) => {
                    println!("provisioned credential for {name}");
                    EXIT_SUCCESS
                },
                Err(err) => {
                    eprintln!("credential provisioning failed: {err}");
                    EXIT_STORAGE
                },
            }
        },
    };

    Ok(code)
}

fn disclose(
    service: &CivIdService,
    requester: &str,
    password: &str,
    attribute: HealthAttribute,
    id: u32,
) -> u8 {
    match service.disclose(requester, password, attribute, PersonId::new(id)) {
        Ok(Disclosure::Granted(Some(value))) => {
            println!("{value}");
            EXIT_SUCCESS
        },
        Ok(Disclosure::Granted(None)) => {
            println!("null");
            EXIT_SUCCESS
        },
        Ok(Disclosure::Denied) => {
            eprintln!("access denied");
            EXIT_DENIED
        },
        Err(err) => {
            eprintln!("query failed: {err}");
            EXIT_STORAGE
        },
    }
}

fn registry_exit_code(err: &RegistryError) -> u8 {
    match err {
        RegistryError::Validation(_) => EXIT_VALIDATION,
        RegistryError::DuplicateIdentity { .. } => EXIT_DUPLICATE,
        RegistryError::IdSpaceExhausted { .. } | RegistryError::Storage(_) => EXIT_STORAGE,
        _ => EXIT_STORAGE,
    }
}

fn record_exit_code(err: &RecordError) -> u8 {
    match err {
        RecordError::Validation(_) => EXIT_VALIDATION,
        RecordError::UnregisteredIdentity { .. } => EXIT_UNREGISTERED,
        RecordError::DuplicateRecord { .. } => EXIT_DUPLICATE,
        RecordError::RecordNotFound { .. } | RecordError::NothingToUpdate => EXIT_NOT_FOUND,
        RecordError::Storage(_) => EXIT_STORAGE,
        _ => EXIT_STORAGE,
    }
}
