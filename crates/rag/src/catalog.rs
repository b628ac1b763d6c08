//! Product catalog loading
//!
//! The catalog is a CSV export with the columns `title`, `product_specs`,
//! `current_price`, `product_promotion` and `color_options`. Only `title`
//! is required; missing columns or cells become empty strings.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use sales_rag_core::Product;

use crate::RagError;

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    product_specs: Option<String>,
    #[serde(default)]
    current_price: Option<String>,
    #[serde(default)]
    product_promotion: Option<String>,
    #[serde(default)]
    color_options: Option<String>,
}

/// Load every product with a non-empty title from a CSV file
pub fn load_products(path: impl AsRef<Path>) -> Result<Vec<Product>, RagError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| RagError::Catalog(format!("Cannot open {}: {}", path.display(), e)))?;

    let products = parse_products(file)?;
    tracing::info!(path = %path.display(), count = products.len(), "Loaded product catalog");
    Ok(products)
}

/// Parse catalog rows from any reader
pub fn parse_products<R: Read>(reader: R) -> Result<Vec<Product>, RagError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut products = Vec::new();
    for (line, record) in csv_reader.deserialize::<CatalogRow>().enumerate() {
        let row = record.map_err(|e| RagError::Catalog(format!("Row {}: {}", line + 1, e)))?;

        let title = row.title.unwrap_or_default();
        if title.trim().is_empty() {
            tracing::warn!(row = line + 1, "Skipping catalog row without title");
            continue;
        }

        products.push(Product {
            title,
            product_specs: row.product_specs.unwrap_or_default(),
            current_price: row.current_price.unwrap_or_default(),
            product_promotion: row.product_promotion.unwrap_or_default(),
            color_options: row.color_options.unwrap_or_default(),
        });
    }

    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "title,product_specs,current_price,product_promotion,color_options
iPhone 15 128GB,\"Chip A16, camera 48MP\",19.990.000 ₫,Giảm 500K,\"Đen, Hồng\"
,orphan row,1,2,3
Samsung Galaxy A15,Màn hình 6.5 inch,4.490.000 ₫,,Xanh
";

    #[test]
    fn test_parse_products() {
        let products = parse_products(CSV.as_bytes()).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].title, "iPhone 15 128GB");
        assert_eq!(products[0].product_specs, "Chip A16, camera 48MP");
        assert_eq!(products[1].product_promotion, "");
    }

    #[test]
    fn test_information_from_csv_row() {
        let products = parse_products(CSV.as_bytes()).unwrap();
        assert_eq!(
            products[0].information(),
            "Tên sản phẩm: iPhone 15 128GB\nMô tả: Chip A16, camera 48MP\nGiá: 19.990.000 ₫\nƯu đãi: Giảm 500K\nMàu sắc: Đen, Hồng\n"
        );
    }

    #[test]
    fn test_missing_columns_are_empty() {
        let csv = "title,current_price\nNokia 105,590.000 ₫\n";
        let products = parse_products(csv.as_bytes()).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].current_price, "590.000 ₫");
        assert_eq!(products[0].product_specs, "");
        assert_eq!(products[0].color_options, "");
    }

    #[test]
    fn test_load_products_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let products = load_products(file.path()).unwrap();
        assert_eq!(products.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = load_products("/nonexistent/catalog.csv").unwrap_err();
        assert!(matches!(err, RagError::Catalog(_)));
    }
}
