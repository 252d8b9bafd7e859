//! Upstream DICOMweb clients

pub mod dicomweb;
