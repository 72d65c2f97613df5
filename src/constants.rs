/// Output schema shared by the geocoded file and every per-candidate file.
pub const FIELDNAMES: [&str; 13] = [
    "committee",
    "candidate",
    "contributor",
    "contributor_type",
    "address",
    "city",
    "state",
    "zip",
    "lat",
    "lon",
    "amount",
    "date",
    "contribution_type",
];

/// Columns of the persisted geocode cache.
pub const GEOCACHE_FIELDNAMES: [&str; 3] = ["address", "lat", "lon"];

/// Combined split output, written next to the per-candidate files.
pub const ALL_CONTRIBUTIONS_FILE: &str = "all.csv";

/// Internal field name → header of the raw contributions export.
pub const RAW_FIELD_MAPPING: [(&str, &str); 10] = [
    ("committee", "Committee Name"),
    ("contributor", "Contributor"),
    ("contributor_type", "Contributor Type"),
    ("contribution_type", "Contribution Type"),
    ("address", "Address"),
    ("city", "City"),
    ("state", "State"),
    ("zip", "Zip"),
    ("amount", "Amount"),
    ("date", "Date of Receipt"),
];

/// Candidates on the ballot for the at-large special election.
pub const SPECIAL_ELECTION_CANDIDATES: [&str; 7] = [
    "Matthew Frumin",
    "Anita Bonds",
    "Michael Brown",
    "Elissa Silverman",
    "Perry Redd",
    "Patrick Mara",
    "Paul Zukerberg",
];

/// Committee lookup value meaning "no candidate".
pub const NOT_APPLICABLE: &str = "N/A";

pub const INDIVIDUAL_CONTRIBUTOR: &str = "Individual";
pub const WASHINGTON_CITY: &str = "WASHINGTON";
pub const DC_STATE: &str = "DC";

/// Date format of `Date of Receipt`, e.g. `11/28/12`.
pub const RECEIPT_DATE_FORMAT: &str = "%m/%d/%y";

pub const DEFAULT_USER_AGENT: &str = "sunlightlabs/dc-campaign-finance";
pub const DEFAULT_SEARCH_URL: &str =
    "http://ocf.dc.gov/registration_statements/pcc/pcc_searchresult.asp";
pub const DEFAULT_GEOCODER_ENDPOINT: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates";
