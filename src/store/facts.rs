//! Fact store: orders, order details and the catalog they reference
//!
//! Like the aggregate store, `FactStore` borrows a connection that the caller
//! has already put inside a transaction. Referential checks happen here so a
//! missing customer, employee or product aborts before anything is written.

use super::decimal::{get_decimal, get_optional_decimal, to_sql_text};
use crate::aggregates::delta::{add_amounts, line_value};
use crate::error::{OmsError, Result};
use crate::model::{
    Category, Customer, Employee, NewOrder, Order, OrderDetail, OrderUpdate, Product, ResolvedLine,
    ResolvedOrder,
};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

/// `(quantity, unit_price)` of one order line
pub type Line = (i64, Decimal);

/// An employee and every line sold through their orders
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeLedger {
    pub employee_id: i64,
    pub last_name: String,
    pub lines: Vec<Line>,
}

/// A customer and every line of their orders
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerLedger {
    pub company_name: String,
    pub lines: Vec<Line>,
}

pub struct FactStore<'c> {
    conn: &'c Connection,
}

impl<'c> FactStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ---- catalog ------------------------------------------------------

    pub fn insert_category(&self, category_name: &str) -> Result<Category> {
        self.conn.execute(
            "INSERT INTO categories (category_name) VALUES (?1)",
            [category_name],
        )?;
        Ok(Category {
            category_id: self.conn.last_insert_rowid(),
            category_name: category_name.to_string(),
        })
    }

    pub fn insert_product(&self, product_name: &str, category_id: i64) -> Result<Product> {
        if !self.exists("SELECT 1 FROM categories WHERE category_id = ?1", category_id)? {
            return Err(OmsError::not_found("category", category_id));
        }
        self.conn.execute(
            "INSERT INTO products (product_name, category_id) VALUES (?1, ?2)",
            params![product_name, category_id],
        )?;
        Ok(Product {
            product_id: self.conn.last_insert_rowid(),
            product_name: product_name.to_string(),
            category_id,
        })
    }

    pub fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO customers (customer_id, company_name, country) VALUES (?1, ?2, ?3)",
            params![customer.customer_id, customer.company_name, customer.country],
        )?;
        Ok(())
    }

    pub fn insert_employee(&self, employee: &Employee) -> Result<()> {
        self.conn.execute(
            "INSERT INTO employees (employee_id, last_name, first_name) VALUES (?1, ?2, ?3)",
            params![employee.employee_id, employee.last_name, employee.first_name],
        )?;
        Ok(())
    }

    pub fn find_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        let customer = self
            .conn
            .prepare_cached(
                "SELECT customer_id, company_name, country FROM customers WHERE customer_id = ?1",
            )?
            .query_row([customer_id], |row| {
                Ok(Customer {
                    customer_id: row.get(0)?,
                    company_name: row.get(1)?,
                    country: row.get(2)?,
                })
            })
            .optional()?;
        Ok(customer)
    }

    pub fn find_employee(&self, employee_id: i64) -> Result<Option<Employee>> {
        let employee = self
            .conn
            .prepare_cached(
                "SELECT employee_id, last_name, first_name FROM employees WHERE employee_id = ?1",
            )?
            .query_row([employee_id], |row| {
                Ok(Employee {
                    employee_id: row.get(0)?,
                    last_name: row.get(1)?,
                    first_name: row.get(2)?,
                })
            })
            .optional()?;
        Ok(employee)
    }

    pub fn find_product(&self, product_id: i64) -> Result<Option<Product>> {
        let product = self
            .conn
            .prepare_cached(
                "SELECT product_id, product_name, category_id FROM products WHERE product_id = ?1",
            )?
            .query_row([product_id], |row| {
                Ok(Product {
                    product_id: row.get(0)?,
                    product_name: row.get(1)?,
                    category_id: row.get(2)?,
                })
            })
            .optional()?;
        Ok(product)
    }

    fn exists(&self, sql: &str, id: impl rusqlite::ToSql) -> Result<bool> {
        Ok(self
            .conn
            .prepare_cached(sql)?
            .query_row([id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn require_refs(&self, customer_id: &str, employee_id: i64) -> Result<()> {
        if self.find_customer(customer_id)?.is_none() {
            return Err(OmsError::not_found("customer", customer_id));
        }
        if self.find_employee(employee_id)?.is_none() {
            return Err(OmsError::not_found("employee", employee_id));
        }
        Ok(())
    }

    // ---- orders -------------------------------------------------------

    pub fn order_exists(&self, order_id: i64) -> Result<bool> {
        self.exists("SELECT 1 FROM orders WHERE order_id = ?1", order_id)
    }

    /// Insert an order and its lines. Returns the new order id.
    pub fn insert_order(&self, order: &NewOrder) -> Result<i64> {
        self.require_refs(&order.customer_id, order.employee_id)?;
        for detail in &order.details {
            if self.find_product(detail.product_id)?.is_none() {
                return Err(OmsError::not_found("product", detail.product_id));
            }
        }

        self.conn.execute(
            "INSERT INTO orders (customer_id, employee_id, order_date) VALUES (?1, ?2, ?3)",
            params![order.customer_id, order.employee_id, order.order_date],
        )?;
        let order_id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO order_details (order_id, product_id, unit_price, quantity)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for detail in &order.details {
            stmt.execute(params![
                order_id,
                detail.product_id,
                to_sql_text(&detail.unit_price),
                detail.quantity
            ])?;
        }

        Ok(order_id)
    }

    /// Remove an order and its lines. Returns the ids of the removed lines.
    pub fn delete_order(&self, order_id: i64) -> Result<Vec<i64>> {
        if !self.order_exists(order_id)? {
            return Err(OmsError::not_found("order", order_id));
        }

        let detail_ids = self
            .conn
            .prepare_cached("SELECT order_detail_id FROM order_details WHERE order_id = ?1 ORDER BY order_detail_id")?
            .query_map([order_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        self.conn
            .execute("DELETE FROM order_details WHERE order_id = ?1", [order_id])?;
        self.conn
            .execute("DELETE FROM orders WHERE order_id = ?1", [order_id])?;

        Ok(detail_ids)
    }

    /// Replace the customer/employee references of an existing order.
    /// Returns the number of order rows touched (0 when the order is gone).
    pub fn update_order_refs(&self, update: &OrderUpdate) -> Result<usize> {
        self.require_refs(&update.customer_id, update.employee_id)?;
        let updated = self.conn.execute(
            "UPDATE orders SET customer_id = ?1, employee_id = ?2, order_date = ?3 WHERE order_id = ?4",
            params![
                update.customer_id,
                update.employee_id,
                update.order_date,
                update.order_id
            ],
        )?;
        Ok(updated)
    }

    pub fn find_order_with_details(&self, order_id: i64) -> Result<Option<Order>> {
        let order = self
            .conn
            .prepare_cached(
                "SELECT order_id, customer_id, employee_id, order_date FROM orders WHERE order_id = ?1",
            )?
            .query_row([order_id], |row| {
                Ok(Order {
                    order_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    employee_id: row.get(2)?,
                    order_date: row.get(3)?,
                    details: Vec::new(),
                })
            })
            .optional()?;

        let Some(mut order) = order else {
            return Ok(None);
        };

        order.details = self
            .conn
            .prepare_cached(
                "SELECT order_detail_id, order_id, product_id, quantity, unit_price
                 FROM order_details WHERE order_id = ?1 ORDER BY order_detail_id",
            )?
            .query_map([order_id], |row| {
                Ok(OrderDetail {
                    order_detail_id: row.get(0)?,
                    order_id: row.get(1)?,
                    product_id: row.get(2)?,
                    quantity: row.get(3)?,
                    unit_price: get_decimal(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(order))
    }

    /// All orders, headers only
    pub fn list_orders(&self) -> Result<Vec<Order>> {
        let orders = self
            .conn
            .prepare_cached(
                "SELECT order_id, customer_id, employee_id, order_date FROM orders ORDER BY order_id",
            )?
            .query_map([], |row| {
                Ok(Order {
                    order_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    employee_id: row.get(2)?,
                    order_date: row.get(3)?,
                    details: Vec::new(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    /// Load an order with its customer, employee and line categories joined in.
    pub fn resolve_order(&self, order_id: i64) -> Result<Option<ResolvedOrder>> {
        let header = self
            .conn
            .prepare_cached(
                "SELECT c.customer_id, c.company_name, c.country,
                        e.employee_id, e.last_name, e.first_name
                 FROM orders o
                 JOIN customers c ON c.customer_id = o.customer_id
                 JOIN employees e ON e.employee_id = o.employee_id
                 WHERE o.order_id = ?1",
            )?
            .query_row([order_id], |row| {
                Ok((
                    Customer {
                        customer_id: row.get(0)?,
                        company_name: row.get(1)?,
                        country: row.get(2)?,
                    },
                    Employee {
                        employee_id: row.get(3)?,
                        last_name: row.get(4)?,
                        first_name: row.get(5)?,
                    },
                ))
            })
            .optional()?;

        let Some((customer, employee)) = header else {
            return Ok(None);
        };

        let lines = self
            .conn
            .prepare_cached(
                "SELECT d.product_id, cat.category_name, d.quantity, d.unit_price
                 FROM order_details d
                 JOIN products p ON p.product_id = d.product_id
                 JOIN categories cat ON cat.category_id = p.category_id
                 WHERE d.order_id = ?1
                 ORDER BY d.order_detail_id",
            )?
            .query_map([order_id], |row| {
                Ok(ResolvedLine {
                    product_id: row.get(0)?,
                    category_name: row.get(1)?,
                    quantity: row.get(2)?,
                    unit_price: get_decimal(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let customers_in_country = self.customers_in_country(&customer.country)?;

        Ok(Some(ResolvedOrder {
            order_id,
            customer,
            employee,
            lines,
            customers_in_country,
        }))
    }

    pub fn customers_in_country(&self, country: &str) -> Result<i64> {
        Ok(self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM customers WHERE country = ?1")?
            .query_row([country], |row| row.get(0))?)
    }

    // ---- grouped reads for seeding and auditing -------------------------

    /// One total per order, zero for an order without lines
    pub fn order_totals(&self) -> Result<Vec<Decimal>> {
        let rows = self
            .conn
            .prepare_cached(
                "SELECT o.order_id, d.quantity, d.unit_price
                 FROM orders o
                 LEFT JOIN order_details d ON d.order_id = o.order_id
                 ORDER BY o.order_id",
            )?
            .query_map([], |row| {
                let quantity: Option<i64> = row.get(1)?;
                let price = get_optional_decimal(row, 2)?;
                Ok((row.get::<_, i64>(0)?, quantity.zip(price)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut totals: Vec<Decimal> = Vec::new();
        let mut current: Option<i64> = None;
        for (order_id, line) in rows {
            if current != Some(order_id) {
                current = Some(order_id);
                totals.push(Decimal::ZERO);
            }
            if let (Some((quantity, price)), Some(total)) = (line, totals.last_mut()) {
                *total = add_amounts(*total, line_value(quantity, price)?)?;
            }
        }
        Ok(totals)
    }

    /// Every category with its product count (zero included)
    pub fn products_per_category(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts(
            "SELECT cat.category_name, COUNT(p.product_id)
             FROM categories cat
             LEFT JOIN products p ON p.category_id = cat.category_id
             GROUP BY cat.category_name",
        )
    }

    pub fn customers_per_country(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts("SELECT country, COUNT(*) FROM customers GROUP BY country")
    }

    pub fn orders_per_country(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts(
            "SELECT c.country, COUNT(o.order_id)
             FROM orders o
             JOIN customers c ON c.customer_id = o.customer_id
             GROUP BY c.country",
        )
    }

    fn grouped_counts(&self, sql: &str) -> Result<Vec<(String, i64)>> {
        let rows = self
            .conn
            .prepare_cached(sql)?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every order line tagged with its product's category name
    pub fn lines_by_category(&self) -> Result<Vec<(String, Line)>> {
        self.tagged_lines(
            "SELECT cat.category_name, d.quantity, d.unit_price
             FROM order_details d
             JOIN products p ON p.product_id = d.product_id
             JOIN categories cat ON cat.category_id = p.category_id",
        )
    }

    /// Every order line tagged with its customer's country
    pub fn lines_by_country(&self) -> Result<Vec<(String, Line)>> {
        self.tagged_lines(
            "SELECT c.country, d.quantity, d.unit_price
             FROM order_details d
             JOIN orders o ON o.order_id = d.order_id
             JOIN customers c ON c.customer_id = o.customer_id",
        )
    }

    fn tagged_lines(&self, sql: &str) -> Result<Vec<(String, Line)>> {
        let rows = self
            .conn
            .prepare_cached(sql)?
            .query_map([], |row| Ok((row.get(0)?, (row.get(1)?, get_decimal(row, 2)?))))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Employees -> orders -> lines, every employee included
    pub fn employee_ledgers(&self) -> Result<Vec<EmployeeLedger>> {
        let rows = self.ledger_rows(
            "SELECT e.employee_id, e.last_name, d.quantity, d.unit_price
             FROM employees e
             LEFT JOIN orders o ON o.employee_id = e.employee_id
             LEFT JOIN order_details d ON d.order_id = o.order_id
             ORDER BY e.employee_id",
        )?;

        let mut ledgers: Vec<EmployeeLedger> = Vec::new();
        for (employee_id, last_name, line) in rows {
            if ledgers.last().map(|l| l.employee_id) != Some(employee_id) {
                ledgers.push(EmployeeLedger {
                    employee_id,
                    last_name,
                    lines: Vec::new(),
                });
            }
            if let (Some(line), Some(ledger)) = (line, ledgers.last_mut()) {
                ledger.lines.push(line);
            }
        }
        Ok(ledgers)
    }

    /// Customers -> orders -> lines, every customer included
    pub fn customer_ledgers(&self) -> Result<Vec<CustomerLedger>> {
        let rows = self.ledger_rows(
            "SELECT c.rowid, c.company_name, d.quantity, d.unit_price
             FROM customers c
             LEFT JOIN orders o ON o.customer_id = c.customer_id
             LEFT JOIN order_details d ON d.order_id = o.order_id
             ORDER BY c.rowid",
        )?;

        let mut ledgers: Vec<CustomerLedger> = Vec::new();
        let mut current: Option<i64> = None;
        for (rowid, company_name, line) in rows {
            if current != Some(rowid) {
                current = Some(rowid);
                ledgers.push(CustomerLedger {
                    company_name,
                    lines: Vec::new(),
                });
            }
            if let (Some(line), Some(ledger)) = (line, ledgers.last_mut()) {
                ledger.lines.push(line);
            }
        }
        Ok(ledgers)
    }

    fn ledger_rows(&self, sql: &str) -> Result<Vec<(i64, String, Option<Line>)>> {
        let rows = self
            .conn
            .prepare_cached(sql)?
            .query_map([], |row| {
                let quantity: Option<i64> = row.get(2)?;
                let line = match quantity {
                    Some(quantity) => Some((quantity, get_decimal(row, 3)?)),
                    None => None,
                };
                Ok((row.get(0)?, row.get(1)?, line))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
