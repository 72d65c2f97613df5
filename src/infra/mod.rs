pub mod arcgis_geocoder;
